//! Boundary validation. Everything here runs before any remote call.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use gemdesk_types::ThinkingLevel;
use regex::Regex;
use thiserror::Error;
use url::{Host, Url};

pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_MESSAGE_LENGTH: usize = 50_000;
pub const MAX_FILENAME_LENGTH: usize = 255;
pub const DEFAULT_MIN_SEND_INTERVAL: Duration = Duration::from_secs(1);

/// Executables and scripts that could run on the user's machine. Source
/// code is allowed.
const DANGEROUS_EXTENSIONS: &[&str] = &[
    ".exe", ".bat", ".cmd", ".com", ".scr", ".vbs", ".msi", ".dll",
];

const PRIVATE_HOST_PREFIXES: &[&str] = &[
    "localhost",
    "127.",
    "10.",
    "172.16.",
    "192.168.",
    "169.254.",
];

const API_KEY_PREFIX: &str = "AIza";
const API_KEY_MIN_LENGTH: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("File is empty")]
    FileEmpty,
    #[error("File exceeds {}MB limit", MAX_FILE_SIZE / (1024 * 1024))]
    FileTooLarge { size: u64 },
    #[error("Cannot access file: {0}")]
    FileInaccessible(String),
    #[error("File type {0} not allowed for security reasons")]
    DangerousExtension(String),
    #[error("URL must be a non-empty string")]
    UrlEmpty,
    #[error("URL exceeds {MAX_URL_LENGTH} character limit")]
    UrlTooLong,
    #[error("URL scheme must be http or https, got: {0}")]
    UrlScheme(String),
    #[error("Cannot access local or private IP addresses")]
    UrlPrivateHost,
    #[error("Malformed URL: {0}")]
    UrlMalformed(String),
    #[error("Message cannot be empty")]
    MessageEmpty,
    #[error("Message exceeds {MAX_MESSAGE_LENGTH} character limit")]
    MessageTooLong { length: usize },
    #[error("API key must be a non-empty string")]
    ApiKeyEmpty,
    #[error("API key format appears invalid")]
    ApiKeyFormat,
    #[error("API key too short")]
    ApiKeyTooShort,
    #[error("API key contains invalid characters")]
    ApiKeyCharacters,
    #[error("Thinking level must be one of: minimal, low, medium, high")]
    ThinkingLevel(String),
    #[error("Rate limit exceeded. Please wait before sending another request.")]
    RateLimited { retry_in: Duration },
}

/// Size must be in `1..=MAX_FILE_SIZE`.
pub fn validate_file_size(size: u64) -> Result<u64, ValidationError> {
    if size == 0 {
        return Err(ValidationError::FileEmpty);
    }
    if size > MAX_FILE_SIZE {
        return Err(ValidationError::FileTooLarge { size });
    }
    Ok(size)
}

pub fn validate_file_path(path: &Path) -> Result<u64, ValidationError> {
    let metadata =
        std::fs::metadata(path).map_err(|e| ValidationError::FileInaccessible(e.to_string()))?;
    validate_file_size(metadata.len())
}

pub fn validate_file_extension(file_name: &str) -> Result<(), ValidationError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()));
    match ext {
        Some(ext) if DANGEROUS_EXTENSIONS.contains(&ext.as_str()) => {
            Err(ValidationError::DangerousExtension(ext))
        }
        _ => Ok(()),
    }
}

fn is_private_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.to_ascii_lowercase();
            PRIVATE_HOST_PREFIXES
                .iter()
                .any(|prefix| domain.starts_with(prefix))
        }
        Host::Ipv4(ip) => is_private_ip(IpAddr::V4(*ip)),
        Host::Ipv6(ip) => is_private_ip(IpAddr::V6(*ip)),
    }
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let rendered = v4.to_string();
            v4 == Ipv4Addr::UNSPECIFIED
                || PRIVATE_HOST_PREFIXES
                    .iter()
                    .any(|prefix| rendered.starts_with(prefix))
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}

/// Trimmed, well-formed http(s) URL that does not point at a local or
/// private address. Returns the parsed URL.
pub fn validate_url(raw: &str) -> Result<Url, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::UrlEmpty);
    }
    if trimmed.len() > MAX_URL_LENGTH {
        return Err(ValidationError::UrlTooLong);
    }

    let url = Url::parse(trimmed).map_err(|e| ValidationError::UrlMalformed(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::UrlScheme(url.scheme().to_string()));
    }
    let Some(host) = url.host() else {
        return Err(ValidationError::UrlMalformed("missing host".to_string()));
    };
    if is_private_host(&host) {
        return Err(ValidationError::UrlPrivateHost);
    }
    Ok(url)
}

/// Trimmed message without NUL bytes.
pub fn validate_message(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MessageEmpty);
    }
    let length = trimmed.chars().count();
    if length > MAX_MESSAGE_LENGTH {
        return Err(ValidationError::MessageTooLong { length });
    }
    Ok(trimmed.replace('\0', ""))
}

fn api_key_charset() -> &'static Regex {
    static CHARSET: OnceLock<Regex> = OnceLock::new();
    CHARSET.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"))
}

pub fn validate_api_key(raw: &str) -> Result<(), ValidationError> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(ValidationError::ApiKeyEmpty);
    }
    if !key.starts_with(API_KEY_PREFIX) {
        return Err(ValidationError::ApiKeyFormat);
    }
    if key.len() < API_KEY_MIN_LENGTH {
        return Err(ValidationError::ApiKeyTooShort);
    }
    if !api_key_charset().is_match(key) {
        return Err(ValidationError::ApiKeyCharacters);
    }
    Ok(())
}

pub fn validate_thinking_level(raw: &str) -> Result<ThinkingLevel, ValidationError> {
    ThinkingLevel::parse(raw).ok_or_else(|| ValidationError::ThinkingLevel(raw.to_string()))
}

/// Base name only, with traversal sequences, separators and NUL removed.
/// Names longer than 255 characters are shortened, keeping the extension
/// when it fits.
#[must_use]
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base.replace("..", "").replace(['/', '\\', '\0'], "");

    if cleaned.chars().count() <= MAX_FILENAME_LENGTH {
        return cleaned;
    }

    let (stem, ext) = match cleaned.rfind('.') {
        Some(dot) if dot > 0 => cleaned.split_at(dot),
        _ => (cleaned.as_str(), ""),
    };
    let ext_len = ext.chars().count();
    if ext_len >= MAX_FILENAME_LENGTH {
        return cleaned.chars().take(MAX_FILENAME_LENGTH).collect();
    }
    let keep = MAX_FILENAME_LENGTH - ext_len;
    let mut shortened: String = stem.chars().take(keep).collect();
    shortened.push_str(ext);
    shortened
}

/// Minimum spacing between chat sends.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SEND_INTERVAL)
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Record a send at `now`, or reject it if the previous one was too recent.
    pub fn check(&mut self, now: Instant) -> Result<(), ValidationError> {
        if let Some(last) = self.last {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Err(ValidationError::RateLimited {
                    retry_in: self.min_interval - elapsed,
                });
            }
        }
        self.last = Some(now);
        Ok(())
    }
}
