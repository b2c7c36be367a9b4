//! Google Gemini REST client.
//!
//! Endpoints used:
//! - resumable upload: `POST /upload/v1beta/files` (start, then upload+finalize)
//! - `GET /v1beta/files/{id}` for processing state
//! - `POST /v1beta/models/{model}:countTokens`
//! - `POST /v1beta/cachedContents`, `DELETE /v1beta/cachedContents/{id}`
//! - `POST /v1beta/models/{model}:streamGenerateContent?alt=sse`
//!
//! When a request references `cachedContent`, tool declarations must live in
//! the cache; they cannot be sent again with the request.

use crate::{
    ApiConfig, CacheHandle, CacheRequest, FileUpload, GenerateRequest, ModelProvider,
    ProviderError, ProviderFuture, Result, SseParseAction, SseParser, StreamEvent,
    base_client_builder, http_client, into_success, mpsc, process_sse_stream,
    retry::{RetryConfig, send_with_retry},
    wire,
};
use chrono::{DateTime, Utc};
use gemdesk_types::{
    Content, FileState, Part, RemoteFile, ResponseChunk, ToolCall, ToolDefinition, ToolSpec,
};
use serde_json::{Value, json};
use uuid::Uuid;

fn part_json(part: &Part) -> Value {
    match part {
        Part::Text(text) => json!({ "text": text }),
        Part::File(file) => json!({
            "fileData": {
                "mimeType": file.mime_type,
                "fileUri": file.uri
            }
        }),
    }
}

pub(crate) fn contents_json(contents: &[Content]) -> Vec<Value> {
    contents
        .iter()
        .map(|content| {
            json!({
                "role": content.role.as_str(),
                "parts": content.parts.iter().map(part_json).collect::<Vec<_>>()
            })
        })
        .collect()
}

fn remove_additional_properties(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("additionalProperties");
            for value in map.values_mut() {
                remove_additional_properties(value);
            }
        }
        Value::Array(values) => {
            for value in values {
                remove_additional_properties(value);
            }
        }
        _ => {}
    }
}

fn function_declarations(tools: &[ToolDefinition]) -> Value {
    let declarations: Vec<Value> = tools
        .iter()
        .map(|t| {
            let mut parameters = t.parameters.clone();
            remove_additional_properties(&mut parameters);
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": parameters
            })
        })
        .collect();
    json!({ "functionDeclarations": declarations })
}

fn tools_json(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .filter_map(|tool| match tool {
            ToolSpec::Functions(defs) if defs.is_empty() => None,
            ToolSpec::Functions(defs) => Some(function_declarations(defs)),
            ToolSpec::GoogleSearch => Some(json!({ "googleSearch": {} })),
        })
        .collect()
}

/// Build the `streamGenerateContent` request body.
pub(crate) fn build_request_body(request: &GenerateRequest) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("contents".into(), json!(contents_json(&request.contents)));

    if let Some(cache) = &request.cached_content {
        body.insert("cachedContent".into(), json!(cache));
    } else {
        let tools = tools_json(&request.tools);
        if !tools.is_empty() {
            body.insert("tools".into(), Value::Array(tools));
        }
    }

    body.insert(
        "generationConfig".into(),
        json!({
            "thinkingConfig": {
                "thinkingLevel": request.thinking_level.as_str()
            }
        }),
    );

    Value::Object(body)
}

/// Build the `cachedContents` create body. This endpoint uses camelCase throughout.
pub(crate) fn build_cache_body(model: &str, request: &CacheRequest) -> Value {
    let mut body = json!({
        "model": format!("models/{model}"),
        "contents": contents_json(&request.contents),
        "ttl": format!("{}s", request.ttl.as_secs())
    });
    if !request.tools.is_empty() {
        body["tools"] = json!([function_declarations(&request.tools)]);
    }
    body
}

fn parse_file_state(raw: Option<&str>, error: Option<&wire::ErrorInfo>) -> FileState {
    match raw {
        Some("PROCESSING") => FileState::Processing,
        Some("ACTIVE") => FileState::Active,
        Some("FAILED") => FileState::Failed(error.map(|e| e.message_or_default().to_string())),
        _ => FileState::Unspecified,
    }
}

fn remote_file(resource: wire::FileResource) -> RemoteFile {
    RemoteFile {
        state: parse_file_state(resource.state.as_deref(), resource.error.as_ref()),
        name: resource.name,
        uri: resource.uri,
        mime_type: resource.mime_type,
    }
}

fn parse_expire_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!(%e, raw, "Invalid cache expireTime");
            None
        }
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

// ========================================================================
// Gemini SSE Parser
// ========================================================================

/// Parser state for Gemini SSE streams.
#[derive(Default)]
pub(crate) struct GeminiParser;

impl SseParser for GeminiParser {
    fn parse(&mut self, json: &Value) -> SseParseAction {
        let response: wire::Response = match serde_json::from_value(json.clone()) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%e, "Failed to parse Gemini SSE event");
                return SseParseAction::Continue;
            }
        };

        if let Some(error) = response.error {
            return SseParseAction::Error(error.describe());
        }

        if let Some(reason) = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            return SseParseAction::Error(format!("Prompt blocked: {reason}"));
        }

        let mut events = Vec::new();
        let mut finish_action: Option<SseParseAction> = None;

        if let Some(usage) = response.usage_metadata {
            tracing::debug!(
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                total_tokens = usage.total_token_count,
                "Gemini usage"
            );
        }

        for candidate in response.candidates.into_iter().flatten() {
            // Content parts before the finish reason so final text is not dropped
            if let Some(content) = candidate.content
                && let Some(parts) = content.parts
            {
                for part in parts {
                    if let Some(text) = part.text
                        && !part.thought
                        && !text.is_empty()
                    {
                        events.push(StreamEvent::Chunk(ResponseChunk::TextDelta(text)));
                    }

                    if let Some(func_call) = part.function_call {
                        let name = func_call.name.unwrap_or_default();
                        if name.is_empty() {
                            tracing::warn!("Gemini function call with empty name, skipping");
                            continue;
                        }
                        // Gemini doesn't assign call ids
                        let id = format!("call_{}", Uuid::new_v4());
                        let args = func_call.args.unwrap_or_else(|| json!({}));
                        events.push(StreamEvent::Chunk(ResponseChunk::ToolCall(ToolCall::new(
                            id, name, args,
                        ))));
                    }
                }
            }

            if let Some(reason_str) = candidate.finish_reason {
                let reason = wire::FinishReason::parse(&reason_str);
                if reason.is_success() {
                    finish_action = Some(SseParseAction::Done);
                } else if let Some(msg) = reason.error_message() {
                    finish_action = Some(SseParseAction::Error(msg.to_string()));
                }
            }
        }

        match finish_action {
            Some(action) if events.is_empty() => action,
            Some(SseParseAction::Done) => {
                events.push(StreamEvent::Done);
                SseParseAction::Emit(events)
            }
            Some(SseParseAction::Error(msg)) => {
                events.push(StreamEvent::Error(msg));
                SseParseAction::Emit(events)
            }
            _ if events.is_empty() => SseParseAction::Continue,
            _ => SseParseAction::Emit(events),
        }
    }
}

// ========================================================================
// Client
// ========================================================================

/// Gemini REST client implementing [`ModelProvider`].
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: ApiConfig,
    client: reqwest::Client,
    retry: RetryConfig,
}

impl GeminiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = if config.https_only() {
            http_client().clone()
        } else {
            base_client_builder(false)
                .build()
                .map_err(|e| ProviderError::Client(e.to_string()))?
        };
        Ok(Self {
            config,
            client,
            retry: RetryConfig::default(),
        })
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn model(&self) -> &str {
        self.config.model().as_str()
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let outcome = send_with_retry(
            || {
                self.client
                    .post(url)
                    .header("x-goog-api-key", self.config.api_key())
                    .json(body)
            },
            Some(self.config.request_timeout()),
            &self.retry,
        )
        .await;
        into_success(outcome).await
    }

    async fn upload(&self, upload: FileUpload) -> Result<RemoteFile> {
        let start_body = json!({ "file": { "display_name": upload.display_name } });
        let start_url = self.config.upload_url();
        let size = upload.bytes.len().to_string();

        let outcome = send_with_retry(
            || {
                self.client
                    .post(&start_url)
                    .header("x-goog-api-key", self.config.api_key())
                    .header("X-Goog-Upload-Protocol", "resumable")
                    .header("X-Goog-Upload-Command", "start")
                    .header("X-Goog-Upload-Header-Content-Length", &size)
                    .header("X-Goog-Upload-Header-Content-Type", &upload.mime_type)
                    .json(&start_body)
            },
            Some(self.config.request_timeout()),
            &self.retry,
        )
        .await;
        let response = into_success(outcome).await?;

        let session_url = response
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("upload start returned no upload URL".to_string())
            })?;

        // Finalize is not replayed: a duplicate would create a second file
        let bytes = upload.bytes;
        let outcome = send_with_retry(
            || {
                self.client
                    .post(&session_url)
                    .header("X-Goog-Upload-Offset", "0")
                    .header("X-Goog-Upload-Command", "upload, finalize")
                    .body(bytes.clone())
            },
            Some(self.config.upload_timeout()),
            &RetryConfig::once(),
        )
        .await;
        let response = into_success(outcome).await?;
        let envelope: wire::FileEnvelope = decode_json(response).await?;

        tracing::info!(
            name = %envelope.file.name,
            display_name = %upload.display_name,
            "Uploaded file to Gemini"
        );
        Ok(remote_file(envelope.file))
    }

    async fn file_status(&self, name: &str) -> Result<RemoteFile> {
        let url = self.config.api_url(name);
        let outcome = send_with_retry(
            || {
                self.client
                    .get(&url)
                    .header("x-goog-api-key", self.config.api_key())
            },
            Some(self.config.request_timeout()),
            &self.retry,
        )
        .await;
        let response = into_success(outcome).await?;
        let resource: wire::FileResource = decode_json(response).await?;
        Ok(remote_file(resource))
    }

    async fn count(&self, contents: &[Content]) -> Result<u64> {
        let url = self
            .config
            .api_url(&format!("models/{}:countTokens", self.model()));
        let body = json!({ "contents": contents_json(contents) });
        let response = self.post_json(&url, &body).await?;
        let counted: wire::CountTokensResponse = decode_json(response).await?;
        Ok(counted.total_tokens)
    }

    async fn create(&self, request: &CacheRequest) -> Result<CacheHandle> {
        let url = self.config.api_url("cachedContents");
        let body = build_cache_body(self.model(), request);
        let response = self.post_json(&url, &body).await?;
        let data: wire::CachedContent = decode_json(response).await?;

        let expire_time = parse_expire_time(data.expire_time.as_deref());
        tracing::info!(name = %data.name, ?expire_time, "Created Gemini cache");
        Ok(CacheHandle {
            name: data.name,
            expire_time,
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let url = self.config.api_url(name);
        let outcome = send_with_retry(
            || {
                self.client
                    .delete(&url)
                    .header("x-goog-api-key", self.config.api_key())
            },
            Some(self.config.request_timeout()),
            &self.retry,
        )
        .await;
        into_success(outcome).await?;
        tracing::debug!(name, "Deleted Gemini cache");
        Ok(())
    }

    async fn stream(&self, request: &GenerateRequest, tx: mpsc::Sender<StreamEvent>) -> Result<()> {
        let url = self.config.api_url(&format!(
            "models/{}:streamGenerateContent?alt=sse",
            self.model()
        ));
        let body = build_request_body(request);

        // No per-attempt timeout: the stream is bounded by the idle timeout
        let outcome = send_with_retry(
            || {
                self.client
                    .post(&url)
                    .header("x-goog-api-key", self.config.api_key())
                    .json(&body)
            },
            None,
            &self.retry,
        )
        .await;

        let response = match into_success(outcome).await {
            Ok(response) => response,
            Err(e) => {
                let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                return Ok(());
            }
        };

        let mut parser = GeminiParser;
        process_sse_stream(response, &mut parser, &tx, self.config.stream_idle_timeout()).await
    }
}

impl ModelProvider for GeminiClient {
    fn upload_file(&self, upload: FileUpload) -> ProviderFuture<'_, RemoteFile> {
        Box::pin(self.upload(upload))
    }

    fn get_file<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, RemoteFile> {
        Box::pin(self.file_status(name))
    }

    fn count_tokens<'a>(&'a self, contents: &'a [Content]) -> ProviderFuture<'a, u64> {
        Box::pin(self.count(contents))
    }

    fn create_cache<'a>(&'a self, request: &'a CacheRequest) -> ProviderFuture<'a, CacheHandle> {
        Box::pin(self.create(request))
    }

    fn delete_cache<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.delete(name))
    }

    fn stream_generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(self.stream(request, tx))
    }
}
