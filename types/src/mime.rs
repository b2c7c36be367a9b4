//! Static extension to mime type table.
//!
//! Every entry also records the shelf category its mime type lands in, so the
//! table and [`categorize`](crate::categorize) can be checked against each other.

use crate::Category;

pub const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MimeEntry {
    /// Lowercase extension including the leading dot.
    pub extension: &'static str,
    pub mime_type: &'static str,
    pub category: Category,
}

impl MimeEntry {
    const fn new(extension: &'static str, mime_type: &'static str, category: Category) -> Self {
        Self {
            extension,
            mime_type,
            category,
        }
    }
}

#[rustfmt::skip]
pub static MIME_TABLE: &[MimeEntry] = &[
    MimeEntry::new(".pdf", "application/pdf", Category::Documents),
    MimeEntry::new(".txt", "text/plain", Category::Documents),
    MimeEntry::new(".md", "text/markdown", Category::Documents),
    MimeEntry::new(".docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document", Category::Documents),
    MimeEntry::new(".xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", Category::Documents),
    MimeEntry::new(".xls", "application/vnd.ms-excel", Category::Documents),
    MimeEntry::new(".pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation", Category::Documents),
    MimeEntry::new(".rtf", "application/rtf", Category::Other),
    MimeEntry::new(".html", "text/html", Category::Documents),
    MimeEntry::new(".htm", "text/html", Category::Documents),
    MimeEntry::new(".json", "application/json", Category::Other),
    MimeEntry::new(".xml", "application/xml", Category::Other),
    MimeEntry::new(".csv", "text/csv", Category::Documents),
    MimeEntry::new(".jpg", "image/jpeg", Category::Images),
    MimeEntry::new(".jpeg", "image/jpeg", Category::Images),
    MimeEntry::new(".png", "image/png", Category::Images),
    MimeEntry::new(".gif", "image/gif", Category::Images),
    MimeEntry::new(".webp", "image/webp", Category::Images),
    MimeEntry::new(".heic", "image/heic", Category::Images),
    MimeEntry::new(".heif", "image/heif", Category::Images),
    MimeEntry::new(".svg", "image/svg+xml", Category::Images),
    MimeEntry::new(".mp4", "video/mp4", Category::Videos),
    MimeEntry::new(".mov", "video/quicktime", Category::Videos),
    MimeEntry::new(".avi", "video/x-msvideo", Category::Videos),
    MimeEntry::new(".mpeg", "video/mpeg", Category::Videos),
    MimeEntry::new(".mpg", "video/mpeg", Category::Videos),
    MimeEntry::new(".flv", "video/x-flv", Category::Videos),
    MimeEntry::new(".webm", "video/webm", Category::Videos),
    MimeEntry::new(".wmv", "video/wmv", Category::Videos),
    MimeEntry::new(".3gp", "video/3gpp", Category::Videos),
    MimeEntry::new(".mp3", "audio/mpeg", Category::Audio),
    MimeEntry::new(".wav", "audio/wav", Category::Audio),
    MimeEntry::new(".aiff", "audio/aiff", Category::Audio),
    MimeEntry::new(".aif", "audio/aiff", Category::Audio),
    MimeEntry::new(".aac", "audio/aac", Category::Audio),
    MimeEntry::new(".ogg", "audio/ogg", Category::Audio),
    MimeEntry::new(".flac", "audio/flac", Category::Audio),
    MimeEntry::new(".ods", "application/vnd.oasis.opendocument.spreadsheet", Category::Documents),
    MimeEntry::new(".odp", "application/vnd.oasis.opendocument.presentation", Category::Documents),
    MimeEntry::new(".odt", "application/vnd.oasis.opendocument.text", Category::Documents),
    MimeEntry::new(".yaml", "text/plain", Category::Documents),
    MimeEntry::new(".yml", "text/plain", Category::Documents),
    MimeEntry::new(".toml", "text/plain", Category::Documents),
    MimeEntry::new(".ini", "text/plain", Category::Documents),
    MimeEntry::new(".cfg", "text/plain", Category::Documents),
    MimeEntry::new(".conf", "text/plain", Category::Documents),
    MimeEntry::new(".config", "text/plain", Category::Documents),
    MimeEntry::new(".log", "text/plain", Category::Documents),
    MimeEntry::new(".sh", "text/plain", Category::Documents),
    MimeEntry::new(".bash", "text/plain", Category::Documents),
    MimeEntry::new(".zsh", "text/plain", Category::Documents),
    MimeEntry::new(".fish", "text/plain", Category::Documents),
    MimeEntry::new(".bat", "text/plain", Category::Documents),
    MimeEntry::new(".cmd", "text/plain", Category::Documents),
    MimeEntry::new(".ps1", "text/plain", Category::Documents),
    MimeEntry::new(".py", "text/plain", Category::Documents),
    MimeEntry::new(".js", "text/plain", Category::Documents),
    MimeEntry::new(".ts", "text/plain", Category::Documents),
    MimeEntry::new(".jsx", "text/plain", Category::Documents),
    MimeEntry::new(".tsx", "text/plain", Category::Documents),
    MimeEntry::new(".css", "text/plain", Category::Documents),
    MimeEntry::new(".scss", "text/plain", Category::Documents),
    MimeEntry::new(".sass", "text/plain", Category::Documents),
    MimeEntry::new(".less", "text/plain", Category::Documents),
    MimeEntry::new(".php", "text/plain", Category::Documents),
    MimeEntry::new(".rb", "text/plain", Category::Documents),
    MimeEntry::new(".pl", "text/plain", Category::Documents),
    MimeEntry::new(".lua", "text/plain", Category::Documents),
    MimeEntry::new(".java", "text/plain", Category::Documents),
    MimeEntry::new(".c", "text/plain", Category::Documents),
    MimeEntry::new(".cc", "text/plain", Category::Documents),
    MimeEntry::new(".cpp", "text/plain", Category::Documents),
    MimeEntry::new(".cxx", "text/plain", Category::Documents),
    MimeEntry::new(".h", "text/plain", Category::Documents),
    MimeEntry::new(".hpp", "text/plain", Category::Documents),
    MimeEntry::new(".hxx", "text/plain", Category::Documents),
    MimeEntry::new(".cs", "text/plain", Category::Documents),
    MimeEntry::new(".go", "text/plain", Category::Documents),
    MimeEntry::new(".rs", "text/plain", Category::Documents),
    MimeEntry::new(".swift", "text/plain", Category::Documents),
    MimeEntry::new(".kt", "text/plain", Category::Documents),
    MimeEntry::new(".kts", "text/plain", Category::Documents),
    MimeEntry::new(".scala", "text/plain", Category::Documents),
    MimeEntry::new(".m", "text/plain", Category::Documents),
    MimeEntry::new(".mm", "text/plain", Category::Documents),
    MimeEntry::new(".bas", "text/plain", Category::Documents),
    MimeEntry::new(".vb", "text/plain", Category::Documents),
    MimeEntry::new(".vbs", "text/plain", Category::Documents),
    MimeEntry::new(".asm", "text/plain", Category::Documents),
    MimeEntry::new(".s", "text/plain", Category::Documents),
    MimeEntry::new(".f", "text/plain", Category::Documents),
    MimeEntry::new(".f90", "text/plain", Category::Documents),
    MimeEntry::new(".pas", "text/plain", Category::Documents),
    MimeEntry::new(".ada", "text/plain", Category::Documents),
    MimeEntry::new(".cob", "text/plain", Category::Documents),
    MimeEntry::new(".for", "text/plain", Category::Documents),
    MimeEntry::new(".hs", "text/plain", Category::Documents),
    MimeEntry::new(".ml", "text/plain", Category::Documents),
    MimeEntry::new(".fs", "text/plain", Category::Documents),
    MimeEntry::new(".clj", "text/plain", Category::Documents),
    MimeEntry::new(".lisp", "text/plain", Category::Documents),
    MimeEntry::new(".scm", "text/plain", Category::Documents),
    MimeEntry::new(".erl", "text/plain", Category::Documents),
    MimeEntry::new(".ex", "text/plain", Category::Documents),
    MimeEntry::new(".exs", "text/plain", Category::Documents),
    MimeEntry::new(".r", "text/plain", Category::Documents),
    MimeEntry::new(".jl", "text/plain", Category::Documents),
    MimeEntry::new(".ipynb", "text/plain", Category::Documents),
    MimeEntry::new(".sql", "text/plain", Category::Documents),
    MimeEntry::new(".vue", "text/plain", Category::Documents),
    MimeEntry::new(".svelte", "text/plain", Category::Documents),
    MimeEntry::new(".ejs", "text/plain", Category::Documents),
    MimeEntry::new(".hbs", "text/plain", Category::Documents),
    MimeEntry::new(".jade", "text/plain", Category::Documents),
    MimeEntry::new(".pug", "text/plain", Category::Documents),
    MimeEntry::new(".gradle", "text/plain", Category::Documents),
    MimeEntry::new(".make", "text/plain", Category::Documents),
    MimeEntry::new(".cmake", "text/plain", Category::Documents),
    MimeEntry::new(".dockerfile", "text/plain", Category::Documents),
    MimeEntry::new(".dockerignore", "text/plain", Category::Documents),
    MimeEntry::new(".gitignore", "text/plain", Category::Documents),
    MimeEntry::new(".gitattributes", "text/plain", Category::Documents),
    MimeEntry::new(".editorconfig", "text/plain", Category::Documents),
    MimeEntry::new(".env", "text/plain", Category::Documents),
    MimeEntry::new(".rst", "text/plain", Category::Documents),
    MimeEntry::new(".asciidoc", "text/plain", Category::Documents),
    MimeEntry::new(".adoc", "text/plain", Category::Documents),
    MimeEntry::new(".textile", "text/plain", Category::Documents),
    MimeEntry::new(".m4a", "audio/mp4", Category::Audio),
    MimeEntry::new(".opus", "audio/opus", Category::Audio),
    MimeEntry::new(".tiff", "image/tiff", Category::Images),
    MimeEntry::new(".bmp", "image/bmp", Category::Images),
    MimeEntry::new(".mkv", "video/x-matroska", Category::Videos),
];

/// Mime type for a file name, by lowercase extension.
///
/// Dotfiles such as `.gitignore` match on the whole name. Unknown extensions
/// map to `application/octet-stream`.
#[must_use]
pub fn mime_for_name(name: &str) -> &'static str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let lower = base.to_ascii_lowercase();
    let extension = match lower.rfind('.') {
        Some(idx) => &lower[idx..],
        None => return OCTET_STREAM,
    };
    MIME_TABLE
        .iter()
        .find(|entry| entry.extension == extension)
        .map_or(OCTET_STREAM, |entry| entry.mime_type)
}
