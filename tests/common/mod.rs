//! Shared test utilities and fixtures
//!
//! A wiremock server standing in for the Gemini REST API, plus a session
//! wired to it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gemdesk_context::PollPolicy;
use gemdesk_engine::{ChatSession, Collaborators, SessionSettings};
use gemdesk_providers::{ApiConfig, GeminiClient, RetryConfig};
use gemdesk_tools::{
    DefaultNormalizer, DefaultThumbnailer, OfficeConverter, SvgChartRenderer, WebFetcher,
};
use gemdesk_types::{ApiKey, ModelName};

pub const STREAM_PATH: &str = "/v1beta/models/gemini-3-flash-preview:streamGenerateContent";
pub const COUNT_PATH: &str = "/v1beta/models/gemini-3-flash-preview:countTokens";

pub fn client(server: &MockServer) -> GeminiClient {
    let config = ApiConfig::new(ApiKey::new("test-key"), ModelName::default())
        .with_base_url(server.uri())
        .with_stream_idle_timeout(Duration::from_secs(5));
    GeminiClient::new(config)
        .unwrap()
        .with_retry_config(RetryConfig {
            max_retries: 0,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.0,
        })
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        min_send_interval: Duration::ZERO,
        poll: PollPolicy {
            interval: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
        },
        ..SessionSettings::default()
    }
}

pub fn collaborators() -> Collaborators {
    Collaborators {
        normalizer: Arc::new(DefaultNormalizer::with_parts(
            OfficeConverter::disabled(),
            WebFetcher::new().unwrap(),
        )),
        thumbnailer: Arc::new(DefaultThumbnailer::images_only()),
        renderer: Arc::new(SvgChartRenderer::default()),
    }
}

pub fn session(server: &MockServer) -> ChatSession {
    ChatSession::new(Arc::new(client(server)), settings(), collaborators())
}

pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Resumable upload: the start request hands out a session URL, the
/// finalize request returns the file already ACTIVE.
pub async fn mount_upload(server: &MockServer, id: &str, mime_type: &str) {
    let session_url = format!("{}/upload-session/{id}", server.uri());
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("x-goog-upload-url", session_url.as_str()),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/upload-session/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file": {
                "name": format!("files/{id}"),
                "uri": format!("https://example.test/files/{id}"),
                "mimeType": mime_type,
                "state": "ACTIVE"
            }
        })))
        .mount(server)
        .await;
}

pub async fn mount_count_tokens(server: &MockServer, total: u64) {
    Mock::given(method("POST"))
        .and(path(COUNT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"totalTokens": total})))
        .mount(server)
        .await;
}

pub async fn mount_cache(server: &MockServer, name: &str) {
    Mock::given(method("POST"))
        .and(path("/v1beta/cachedContents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": name,
            "expireTime": "2099-01-01T00:00:00Z"
        })))
        .mount(server)
        .await;
}

pub async fn mount_cache_delete(server: &MockServer, name: &str, times: u64) {
    Mock::given(method("DELETE"))
        .and(path(format!("/v1beta/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(times)
        .mount(server)
        .await;
}

pub fn sse_body(chunks: &[Value]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("data: {chunk}\r\n\r\n"))
        .collect()
}

pub fn text_chunk(text: &str) -> Value {
    json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
}

pub fn final_chunk(text: &str) -> Value {
    json!({"candidates": [{"content": {"parts": [{"text": text}]}, "finishReason": "STOP"}]})
}

pub async fn mount_stream(server: &MockServer, chunks: &[Value]) {
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(chunks)),
        )
        .mount(server)
        .await;
}

/// JSON bodies of every generate request the server saw, in order.
pub async fn generate_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == STREAM_PATH)
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}
