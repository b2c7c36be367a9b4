//! Shelf items and the remote files behind them.

use serde::{Deserialize, Serialize};

use crate::FileRef;

/// Display-name prefix for scraped web pages.
pub const LINK_MARKER: &str = "🔗";
/// Display-name prefix for voice recordings.
pub const RECORDING_MARKER: &str = "🎤";

/// Office extensions counted as documents regardless of mime type.
const OFFICE_EXTENSIONS: &[&str] = &[".xlsx", ".xls", ".ods", ".pptx", ".odp", ".docx"];

const LINK_PREVIEW_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Documents,
    Images,
    Videos,
    Audio,
    Links,
    Other,
}

impl Category {
    /// Display order of category groups.
    pub const ORDER: [Category; 6] = [
        Category::Documents,
        Category::Images,
        Category::Videos,
        Category::Audio,
        Category::Links,
        Category::Other,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Category::Documents => "Documents",
            Category::Images => "Images",
            Category::Videos => "Videos",
            Category::Audio => "Audio",
            Category::Links => "Links",
            Category::Other => "Other",
        }
    }
}

/// Assign a shelf category. Total: every input lands somewhere.
///
/// Marker prefixes win over mime rules; mime substrings are checked in the
/// order image, video, audio, then document-like.
#[must_use]
pub fn categorize(display_name: &str, mime_type: &str) -> Category {
    if display_name.starts_with(LINK_MARKER) {
        return Category::Links;
    }
    if display_name.starts_with(RECORDING_MARKER) {
        return Category::Audio;
    }

    let mime = mime_type.to_ascii_lowercase();
    if mime.contains("image") {
        return Category::Images;
    }
    if mime.contains("video") {
        return Category::Videos;
    }
    if mime.contains("audio") {
        return Category::Audio;
    }

    let name = display_name.to_ascii_lowercase();
    if mime.contains("pdf")
        || mime.contains("text")
        || OFFICE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
    {
        return Category::Documents;
    }
    Category::Other
}

/// Shelf label for a scraped URL: link marker plus the first 30 characters.
#[must_use]
pub fn link_display_name(url: &str) -> String {
    let preview: String = url.chars().take(LINK_PREVIEW_CHARS).collect();
    format!("{LINK_MARKER} {preview}...")
}

/// Provider-side processing state of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Processing,
    Active,
    Failed(Option<String>),
    Unspecified,
}

/// A file as known to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Resource name, e.g. `files/abc123`.
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
}

/// One ingested file on the shelf. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    display_name: String,
    remote_name: String,
    remote_uri: String,
    mime_type: String,
    token_count: u64,
    thumbnail: Option<Vec<u8>>,
}

impl UploadedFile {
    #[must_use]
    pub fn new(
        display_name: impl Into<String>,
        remote: &RemoteFile,
        token_count: u64,
        thumbnail: Option<Vec<u8>>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            remote_name: remote.name.clone(),
            remote_uri: remote.uri.clone(),
            mime_type: remote.mime_type.clone(),
            token_count,
            thumbnail,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    #[must_use]
    pub fn remote_uri(&self) -> &str {
        &self.remote_uri
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    #[must_use]
    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    /// PNG preview bytes, if one could be produced.
    #[must_use]
    pub fn thumbnail(&self) -> Option<&[u8]> {
        self.thumbnail.as_deref()
    }

    #[must_use]
    pub fn category(&self) -> Category {
        categorize(&self.display_name, &self.mime_type)
    }

    #[must_use]
    pub fn file_ref(&self) -> FileRef {
        FileRef {
            uri: self.remote_uri.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}
