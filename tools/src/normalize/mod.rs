//! Format normalization: user files and URLs into uploadable payloads.
//!
//! Spreadsheets become CSV, word-processor and presentation files become PDF
//! (through an installed office suite) or plain text, everything else goes up
//! as-is with the mime type from the static table. URLs are either downloaded
//! and normalized like a local file, or scraped to text.

mod office;
mod web;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use gemdesk_types::{link_display_name, mime_for_name};
use tempfile::TempPath;
use thiserror::Error;
use url::Url;

pub use office::{
    OfficeConverter, OfficeError, docx_text, odf_text, pptx_text, spreadsheet_to_csv,
};
pub use web::{
    DIRECT_CONTENT_TYPES, DIRECT_EXTENSIONS, Downloaded, WebFetcher, html_to_text,
    is_direct_content_type,
};

pub type NormalizeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<NormalizedFile, NormalizeError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Failed to convert {name}: {source}")]
    Conversion {
        name: String,
        #[source]
        source: OfficeError,
    },
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Failed to fetch {url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("Download exceeds {}MB limit", gemdesk_utils::MAX_FILE_SIZE / (1024 * 1024))]
    TooLarge,
    #[error("Conversion task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
enum Payload {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// Content ready for upload.
///
/// Owns any temporary artifact produced along the way; dropping the value
/// deletes it, whichever way the upload went.
#[derive(Debug)]
pub struct NormalizedFile {
    display_name: String,
    mime_type: String,
    payload: Payload,
    preview_source: Option<PathBuf>,
    artifact: Option<TempPath>,
}

impl NormalizedFile {
    fn from_bytes(display_name: impl Into<String>, mime_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            display_name: display_name.into(),
            mime_type: mime_type.to_string(),
            payload: Payload::Bytes(bytes),
            preview_source: None,
            artifact: None,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Local file a thumbnail can be generated from, if any.
    #[must_use]
    pub fn preview_source(&self) -> Option<&Path> {
        self.preview_source.as_deref()
    }

    #[must_use]
    pub fn has_artifact(&self) -> bool {
        self.artifact.is_some()
    }

    pub async fn read_payload(&self) -> Result<Vec<u8>, NormalizeError> {
        match &self.payload {
            Payload::Bytes(bytes) => Ok(bytes.clone()),
            Payload::Path(path) => Ok(tokio::fs::read(path).await?),
        }
    }
}

/// Turns files and URLs into [`NormalizedFile`]s.
pub trait FormatNormalizer: Send + Sync {
    fn normalize<'a>(&'a self, path: &'a Path, declared_name: &'a str) -> NormalizeFuture<'a>;

    fn normalize_url<'a>(&'a self, url: &'a Url) -> NormalizeFuture<'a>;
}

pub const SPREADSHEET_EXTENSIONS: &[&str] = &[".xlsx", ".xls", ".ods"];

fn extension(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.rfind('.')
        .filter(|idx| *idx > 0)
        .map(|idx| base[idx..].to_ascii_lowercase())
}

#[derive(Debug, Clone)]
pub struct DefaultNormalizer {
    office: OfficeConverter,
    web: WebFetcher,
}

impl DefaultNormalizer {
    /// Detects an installed office suite and builds the web client.
    pub fn new() -> Result<Self, NormalizeError> {
        Ok(Self::with_parts(OfficeConverter::detect(), WebFetcher::new()?))
    }

    #[must_use]
    pub fn with_parts(office: OfficeConverter, web: WebFetcher) -> Self {
        Self { office, web }
    }

    async fn convert<F>(path: &Path, name: &str, convert: F) -> Result<String, NormalizeError>
    where
        F: FnOnce(&Path) -> Result<String, OfficeError> + Send + 'static,
    {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || convert(&owned))
            .await?
            .map_err(|source| NormalizeError::Conversion {
                name: name.to_string(),
                source,
            })
    }

    async fn normalize_path(
        &self,
        path: &Path,
        declared_name: &str,
    ) -> Result<NormalizedFile, NormalizeError> {
        let ext = extension(declared_name)
            .or_else(|| extension(&path.to_string_lossy()))
            .unwrap_or_default();

        let mut normalized = match ext.as_str() {
            e if SPREADSHEET_EXTENSIONS.contains(&e) => {
                let csv = Self::convert(path, declared_name, spreadsheet_to_csv).await?;
                NormalizedFile::from_bytes(declared_name, "text/csv", csv.into_bytes())
            }
            ".docx" | ".pptx" => {
                if let Some(pdf) = self.office.to_pdf(path).await {
                    NormalizedFile::from_bytes(declared_name, "application/pdf", pdf)
                } else {
                    let text = if ext == ".docx" {
                        Self::convert(path, declared_name, docx_text).await?
                    } else {
                        Self::convert(path, declared_name, pptx_text).await?
                    };
                    NormalizedFile::from_bytes(declared_name, "text/plain", text.into_bytes())
                }
            }
            ".odt" | ".odp" => {
                let text = Self::convert(path, declared_name, odf_text).await?;
                NormalizedFile::from_bytes(declared_name, "text/plain", text.into_bytes())
            }
            _ => NormalizedFile {
                display_name: declared_name.to_string(),
                mime_type: mime_for_name(declared_name).to_string(),
                payload: Payload::Path(path.to_path_buf()),
                preview_source: None,
                artifact: None,
            },
        };
        normalized.preview_source = Some(path.to_path_buf());

        tracing::debug!(
            name = declared_name,
            mime = %normalized.mime_type,
            "Normalized file"
        );
        Ok(normalized)
    }

    async fn normalize_link(&self, url: &Url) -> Result<NormalizedFile, NormalizeError> {
        if self.web.is_direct_file(url).await {
            let Downloaded { path, file_name } = self.web.download(url).await?;
            let mut normalized = self.normalize_path(&path, &file_name).await?;
            normalized.artifact = Some(path);
            return Ok(normalized);
        }

        let text = self.web.scrape(url).await?;
        Ok(NormalizedFile::from_bytes(
            link_display_name(url.as_str()),
            "text/plain",
            text.into_bytes(),
        ))
    }
}

impl FormatNormalizer for DefaultNormalizer {
    fn normalize<'a>(&'a self, path: &'a Path, declared_name: &'a str) -> NormalizeFuture<'a> {
        Box::pin(self.normalize_path(path, declared_name))
    }

    fn normalize_url<'a>(&'a self, url: &'a Url) -> NormalizeFuture<'a> {
        Box::pin(self.normalize_link(url))
    }
}
