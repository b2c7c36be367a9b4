//! URL ingestion: direct-file detection, download, and page scraping.

use std::io::Write;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use scraper::{Html, Node};
use tempfile::TempPath;
use url::Url;

use gemdesk_types::MIME_TABLE;
use gemdesk_utils::{MAX_FILE_SIZE, sanitize_filename, validate_url};

use super::NormalizeError;

/// Content-type fragments that mark a URL as a file rather than a page.
pub const DIRECT_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "image/",
    "video/",
    "audio/",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats",
    "application/vnd.oasis.opendocument",
    "application/msword",
    "text/plain",
    "text/csv",
];

/// URL suffixes that mark a file when the HEAD response is inconclusive.
pub const DIRECT_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".webp", ".mp4", ".mov", ".avi", ".mp3", ".wav",
    ".xlsx", ".docx", ".pptx", ".csv", ".txt",
];

/// Extensions trusted from a download URL's last path segment.
const DOWNLOAD_EXTENSIONS: &[&str] = &[
    ".pdf", ".png", ".jpg", ".jpeg", ".gif", ".webp", ".mp4", ".mov", ".avi", ".mp3", ".wav",
    ".doc", ".docx", ".xlsx", ".pptx", ".csv", ".txt", ".zip",
];

const USER_AGENT: &str = "Mozilla/5.0";
const HEAD_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 5;

#[must_use]
pub fn is_direct_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    DIRECT_CONTENT_TYPES
        .iter()
        .any(|fragment| content_type.contains(fragment))
}

fn has_direct_extension(url: &Url) -> bool {
    let lower = url.as_str().to_ascii_lowercase();
    DIRECT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Extension for a downloaded body: trusted URL suffix first, then the
/// content type.
fn download_extension(file_name: &str, content_type: &str) -> String {
    if let Some(idx) = file_name.rfind('.') {
        let ext = file_name[idx..].to_ascii_lowercase();
        if DOWNLOAD_EXTENSIONS.contains(&ext.as_str()) {
            return ext;
        }
    }
    if let Some(entry) = MIME_TABLE.iter().find(|e| e.mime_type == content_type) {
        return entry.extension.to_string();
    }
    if content_type.starts_with("image/") {
        ".jpg".to_string()
    } else if content_type.starts_with("video/") {
        ".mp4".to_string()
    } else {
        ".bin".to_string()
    }
}

/// Visible text of an HTML page: scripts and styles dropped, each line
/// trimmed, runs of double spaces split into separate lines, blanks removed.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style"))
        });
        if !hidden {
            raw.push_str(text);
        }
    }

    raw.lines()
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A downloaded file. The temp path is deleted on drop.
#[derive(Debug)]
pub struct Downloaded {
    pub path: TempPath,
    /// Sanitized last URL path segment, with an extension appended when it
    /// had none.
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub struct WebFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl WebFetcher {
    /// Redirects are followed only to public http(s) hosts.
    pub fn new() -> Result<Self, NormalizeError> {
        let policy = Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if let Err(e) = validate_url(attempt.url().as_str()) {
                attempt.error(e)
            } else {
                attempt.follow()
            }
        });
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(policy)
            .connect_timeout(HEAD_TIMEOUT)
            .build()
            .map_err(NormalizeError::Client)?;
        Ok(Self {
            client,
            max_bytes: MAX_FILE_SIZE,
        })
    }

    /// Body size limit for downloads and scraped pages. Defaults to
    /// `MAX_FILE_SIZE`.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// HEAD the URL and decide whether it names a file. Network failures
    /// count as "not a file" so the caller falls back to scraping.
    pub async fn is_direct_file(&self, url: &Url) -> bool {
        let content_type = match self
            .client
            .head(url.clone())
            .timeout(HEAD_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            Err(e) => {
                tracing::debug!(url = %url, "HEAD request failed: {e}");
                String::new()
            }
        };
        is_direct_content_type(&content_type) || has_direct_extension(url)
    }

    async fn get(&self, url: &Url, timeout: Duration) -> Result<reqwest::Response, NormalizeError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| NormalizeError::Fetch {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(NormalizeError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    /// Stream the body into a temp file named after the URL.
    pub async fn download(&self, url: &Url) -> Result<Downloaded, NormalizeError> {
        let response = self.get(url, DOWNLOAD_TIMEOUT).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .unwrap_or_default();

        let segment = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("downloaded_file");
        let ext = download_extension(segment, &content_type);
        let file_name = if segment.to_ascii_lowercase().ends_with(&ext) {
            sanitize_filename(segment)
        } else {
            sanitize_filename(&format!("{segment}{ext}"))
        };

        let mut temp = tempfile::Builder::new().suffix(&ext).tempfile()?;
        let mut written: u64 = 0;
        self.read_capped(url, response, |chunk| {
            written += chunk.len() as u64;
            temp.write_all(chunk)
        })
        .await?;
        temp.flush()?;

        tracing::info!(url = %url, file = %file_name, bytes = written, "Downloaded file");
        Ok(Downloaded {
            path: temp.into_temp_path(),
            file_name,
        })
    }

    /// Stream the body through `sink`, failing once it passes `max_bytes`.
    async fn read_capped(
        &self,
        url: &Url,
        response: reqwest::Response,
        mut sink: impl FnMut(&[u8]) -> std::io::Result<()>,
    ) -> Result<(), NormalizeError> {
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes)
        {
            return Err(NormalizeError::TooLarge);
        }

        let mut read: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| NormalizeError::Fetch {
                url: url.to_string(),
                source,
            })?;
            read += chunk.len() as u64;
            if read > self.max_bytes {
                return Err(NormalizeError::TooLarge);
            }
            sink(&chunk)?;
        }
        Ok(())
    }

    /// Fetch an HTML page and reduce it to `URL: <url>\n\n<text>`.
    pub async fn scrape(&self, url: &Url) -> Result<String, NormalizeError> {
        let response = self.get(url, SCRAPE_TIMEOUT).await?;
        let mut body = Vec::new();
        self.read_capped(url, response, |chunk| {
            body.extend_from_slice(chunk);
            Ok(())
        })
        .await?;
        let html = String::from_utf8_lossy(&body);
        let text = html_to_text(&html);
        tracing::info!(url = %url, chars = text.len(), "Scraped page");
        Ok(format!("URL: {url}\n\n{text}"))
    }
}
