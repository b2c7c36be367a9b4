//! Gemini provider client with streaming support.
//!
//! # Architecture
//!
//! - [`ModelProvider`] - the boundary the session layer talks to: file upload
//!   and status, token counting, context caches and streamed generation
//! - [`gemini::GeminiClient`] - the REST implementation against
//!   `generativelanguage.googleapis.com`
//! - [`retry`] - exponential-backoff retry for every request's connection phase
//! - [`wire`] - typed response payloads
//! - `fake` (feature `test-support`) - scripted in-memory provider
//!
//! Streamed output is delivered through a [`tokio::sync::mpsc::Sender<StreamEvent>`]
//! channel, decoded once into [`ResponseChunk`](gemdesk_types::ResponseChunk)
//! values so downstream code never inspects raw JSON.
//!
//! # Error Handling
//!
//! API errors during streaming are delivered as `StreamEvent::Error` events
//! rather than `Result::Err` returns, allowing partial output to be captured
//! before the error occurs. Non-streaming calls return [`ProviderError`].

#[cfg(feature = "test-support")]
pub mod fake;
pub mod gemini;
pub mod retry;
pub mod wire;

use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
pub(crate) use gemdesk_types::StreamEvent;
use gemdesk_types::{
    ApiKey, Content, ModelName, RemoteFile, ThinkingLevel, ToolDefinition, ToolSpec,
};
pub(crate) use tokio::sync::mpsc;

pub use gemdesk_types;
pub use gemini::GeminiClient;
pub use retry::RetryConfig;

/// Canonical Gemini API host.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_API_VERSION: &str = "v1beta";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 600;

// reqwest only exposes tcp_keepalive (idle time); interval/retries use platform defaults.
const TCP_KEEPALIVE_SECS: u64 = 60;

const POOL_MAX_IDLE_PER_HOST: usize = 100;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_SSE_BUFFER_BYTES: usize = 4 * 1024 * 1024;

const MAX_SSE_PARSE_ERRORS: usize = 3;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

// ============================================================================
// Errors
// ============================================================================

/// Wording that marks an API error as a quota or tier restriction.
const RESTRICTION_MARKERS: &[&str] = &[
    "resource_exhausted",
    "quota",
    "free tier",
    "not supported",
    "not available",
    "billing",
];

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("request failed after {attempts} attempts: {source}")]
    Connection {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("HTTP client: {0}")]
    Client(String),
}

impl ProviderError {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Quota exhaustion or a capability the caller's tier does not include.
    #[must_use]
    pub fn is_quota_restricted(&self) -> bool {
        match self {
            ProviderError::Api { status, message } => {
                let lower = message.to_ascii_lowercase();
                *status == 429 || RESTRICTION_MARKERS.iter().any(|m| lower.contains(m))
            }
            _ => false,
        }
    }
}

pub type Result<T, E = ProviderError> = std::result::Result<T, E>;

// ============================================================================
// HTTP client
// ============================================================================

/// Shared hardened client for HTTPS endpoints.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder(true).build().unwrap_or_else(|e| {
            tracing::error!(
                "Failed to build hardened HTTP client: {e}. Attempting minimal hardened fallback."
            );
            reqwest::Client::builder()
                .https_only(true)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Minimal hardened HTTP client must build; cannot proceed without TLS")
        })
    })
}

pub(crate) fn base_client_builder(https_only: bool) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .https_only(https_only)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .user_agent(concat!("gemdesk/", env!("CARGO_PKG_VERSION")))
}

pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Turn a non-2xx response into [`ProviderError::Api`], preferring the
/// structured `error.message` of the body.
pub(crate) async fn api_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = read_capped_error_body(response).await;
    let message = match serde_json::from_str::<wire::ErrorEnvelope>(&body) {
        Ok(envelope) => envelope.error.describe(),
        Err(_) if body.trim().is_empty() => "no response body".to_string(),
        Err(_) => body,
    };
    ProviderError::Api { status, message }
}

/// Collapse a retry outcome into a successful response or an error.
pub(crate) async fn into_success(outcome: retry::RetryOutcome) -> Result<reqwest::Response> {
    match outcome {
        retry::RetryOutcome::Success(response) => Ok(response),
        retry::RetryOutcome::HttpError(response) => Err(api_error(response).await),
        retry::RetryOutcome::ConnectionError { attempts, source } => {
            Err(ProviderError::Connection { attempts, source })
        }
        retry::RetryOutcome::NonRetryable(e) => Err(ProviderError::Transport(e)),
    }
}

// ============================================================================
// SSE processing
// ============================================================================

fn find_sse_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a <= b { (a, 2) } else { (b, 4) }),
        (Some(a), None) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

fn drain_next_sse_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_sse_event_boundary(buffer)?;
    let event = buffer[..pos].to_vec();
    buffer.drain(..pos + delim_len);
    Some(event)
}

fn extract_sse_data(event: &str) -> Option<String> {
    let mut data = String::new();
    let mut found = false;

    for line in event.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(mut rest) = line.strip_prefix("data:") {
            if let Some(stripped) = rest.strip_prefix(' ') {
                rest = stripped;
            }

            if found {
                data.push('\n');
            }
            data.push_str(rest);
            found = true;
        }
    }

    if found { Some(data) } else { None }
}

#[derive(Debug)]
pub(crate) enum SseParseAction {
    /// Continue processing, no event to emit
    Continue,
    /// Emit these events and continue
    Emit(Vec<StreamEvent>),
    /// Stream is done (finishReason=STOP)
    Done,
    Error(String),
}

pub(crate) trait SseParser {
    fn parse(&mut self, json: &serde_json::Value) -> SseParseAction;
}

pub(crate) async fn send_event(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

/// Drive an SSE response through a parser, forwarding events to `tx`.
///
/// - Idle timeout between chunks
/// - 4 MiB buffer cap
/// - UTF-8 validation
/// - `[DONE]` marker handling
/// - Consecutive parse errors beyond a threshold end the stream
/// - EOF without a completion signal is reported as an error
pub(crate) async fn process_sse_stream<P: SseParser>(
    response: reqwest::Response,
    parser: &mut P,
    tx: &mpsc::Sender<StreamEvent>,
    idle_timeout: Duration,
) -> Result<()> {
    use futures_util::StreamExt;

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut parse_errors = 0usize;

    loop {
        let Ok(next) = tokio::time::timeout(idle_timeout, stream.next()).await else {
            let _ = send_event(tx, StreamEvent::Error("Stream idle timeout".to_string())).await;
            return Ok(());
        };

        let Some(chunk) = next else { break };
        let chunk = chunk?;
        buffer.extend_from_slice(&chunk);

        if buffer.len() > MAX_SSE_BUFFER_BYTES {
            let _ = send_event(
                tx,
                StreamEvent::Error("SSE buffer exceeded maximum size (4 MiB)".to_string()),
            )
            .await;
            return Ok(());
        }

        while let Some(event) = drain_next_sse_event(&mut buffer) {
            if event.is_empty() {
                continue;
            }

            let Ok(event) = std::str::from_utf8(&event) else {
                let _ = send_event(
                    tx,
                    StreamEvent::Error("Received invalid UTF-8 from SSE stream".to_string()),
                )
                .await;
                return Ok(());
            };

            let Some(data) = extract_sse_data(event) else {
                continue;
            };

            if data == "[DONE]" {
                let _ = send_event(tx, StreamEvent::Done).await;
                return Ok(());
            }

            match serde_json::from_str::<serde_json::Value>(&data) {
                Ok(json) => {
                    parse_errors = 0;
                    match parser.parse(&json) {
                        SseParseAction::Continue => {}
                        SseParseAction::Emit(events) => {
                            for event in events {
                                let is_terminal =
                                    matches!(&event, StreamEvent::Done | StreamEvent::Error(_));
                                if !send_event(tx, event).await || is_terminal {
                                    return Ok(());
                                }
                            }
                        }
                        SseParseAction::Done => {
                            let _ = send_event(tx, StreamEvent::Done).await;
                            return Ok(());
                        }
                        SseParseAction::Error(msg) => {
                            let _ = send_event(tx, StreamEvent::Error(msg)).await;
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    parse_errors = parse_errors.saturating_add(1);
                    tracing::warn!(%e, payload_bytes = data.len(), "Invalid SSE JSON payload");
                    if parse_errors >= MAX_SSE_PARSE_ERRORS {
                        let _ = send_event(
                            tx,
                            StreamEvent::Error(format!("Invalid stream payload: {e}")),
                        )
                        .await;
                        return Ok(());
                    }
                }
            }
        }
    }

    // Premature EOF: connection closed without completion signal
    let _ = send_event(
        tx,
        StreamEvent::Error("Connection closed before stream completed".to_string()),
    )
    .await;
    Ok(())
}

// ============================================================================
// Configuration
// ============================================================================

/// Credentials, model and endpoint settings for the Gemini client.
///
/// ```rust
/// use gemdesk_providers::ApiConfig;
/// use gemdesk_types::{ApiKey, ModelName};
///
/// let config = ApiConfig::new(ApiKey::new("test"), ModelName::default())
///     .with_base_url("http://127.0.0.1:8080");
/// assert!(!config.https_only());
/// ```
#[derive(Debug, Clone)]
pub struct ApiConfig {
    api_key: ApiKey,
    model: ModelName,
    base_url: String,
    request_timeout: Duration,
    upload_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl ApiConfig {
    #[must_use]
    pub fn new(api_key: ApiKey, model: ModelName) -> Self {
        Self {
            api_key,
            model,
            base_url: GEMINI_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
            stream_idle_timeout: Duration::from_secs(DEFAULT_STREAM_IDLE_TIMEOUT_SECS),
        }
    }

    /// Point the client at another host, e.g. a local mock server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api_key.as_str()
    }

    #[must_use]
    pub fn model(&self) -> &ModelName {
        &self.model
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Plain-HTTP base URLs are only used against local test servers.
    #[must_use]
    pub fn https_only(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn upload_timeout(&self) -> Duration {
        self.upload_timeout
    }

    #[must_use]
    pub fn stream_idle_timeout(&self) -> Duration {
        self.stream_idle_timeout
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}/{GEMINI_API_VERSION}/{path}", self.base_url)
    }

    pub(crate) fn upload_url(&self) -> String {
        format!("{}/upload/{GEMINI_API_VERSION}/files", self.base_url)
    }
}

// ============================================================================
// Provider boundary
// ============================================================================

/// Content to ingest, with its declared mime type.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub display_name: String,
}

/// Provider-side context cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHandle {
    /// Cache name returned by API (e.g., "cachedContents/abc123")
    pub name: String,
    pub expire_time: Option<DateTime<Utc>>,
}

impl CacheHandle {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expire_time.is_some_and(|t| Utc::now() >= t)
    }
}

#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub contents: Vec<Content>,
    pub tools: Vec<ToolDefinition>,
    pub ttl: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    /// When set, tools and cached files come from the cache.
    pub cached_content: Option<String>,
    pub tools: Vec<ToolSpec>,
    pub thinking_level: ThinkingLevel,
}

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Remote model operations used by the session layer.
///
/// Boxed futures keep the trait dyn-compatible so sessions can hold an
/// `Arc<dyn ModelProvider>` and tests can substitute a fake.
pub trait ModelProvider: Send + Sync {
    fn upload_file(&self, upload: FileUpload) -> ProviderFuture<'_, RemoteFile>;

    fn get_file<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, RemoteFile>;

    fn count_tokens<'a>(&'a self, contents: &'a [Content]) -> ProviderFuture<'a, u64>;

    fn create_cache<'a>(&'a self, request: &'a CacheRequest) -> ProviderFuture<'a, CacheHandle>;

    fn delete_cache<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()>;

    /// Stream a generation. API failures arrive as `StreamEvent::Error`; the
    /// stream ends with exactly one `Done` or `Error` unless the receiver hangs up.
    fn stream_generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> ProviderFuture<'a, ()>;
}
