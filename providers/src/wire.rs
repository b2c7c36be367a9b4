//! Typed Gemini REST payloads.
//!
//! These types decode the JSON the Gemini API returns: streamed
//! `GenerateContentResponse` chunks, file resources, token counts, cached
//! contents and error envelopes. Only fields the client reads are modelled.

use serde::Deserialize;

/// Token usage data returned by Gemini API.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
}

/// One SSE chunk of `streamGenerateContent`.
///
/// Gemini doesn't use event types. Each SSE chunk is a complete response
/// object with candidates.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub candidates: Option<Vec<Candidate>>,
    pub error: Option<ErrorInfo>,
    pub usage_metadata: Option<UsageMetadata>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Content {
    pub parts: Option<Vec<Part>>,
}

/// A content part in a Gemini response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    /// Whether this is thinking content
    #[serde(default)]
    pub thought: bool,
    pub function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
pub struct FunctionCall {
    pub name: Option<String>,
    pub args: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorInfo {
    pub message: Option<String>,
    pub code: Option<i32>,
    pub status: Option<String>,
}

impl ErrorInfo {
    #[must_use]
    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or("Unknown error")
    }

    /// `STATUS: message`, or just the message when no status is present.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.status.as_deref() {
            Some(status) if !status.is_empty() => {
                format!("{status}: {}", self.message_or_default())
            }
            _ => self.message_or_default().to_string(),
        }
    }
}

/// Error body of a non-2xx REST response.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorInfo,
}

/// Known Gemini finish reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Language,
    Blocklist,
    ProhibitedContent,
    Spii,
    MalformedFunctionCall,
    TooManyToolCalls,
    UnexpectedToolCall,
    Other,
    Unknown,
}

impl FinishReason {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "STOP" => Self::Stop,
            "MAX_TOKENS" => Self::MaxTokens,
            "SAFETY" => Self::Safety,
            "RECITATION" => Self::Recitation,
            "LANGUAGE" => Self::Language,
            "BLOCKLIST" => Self::Blocklist,
            "PROHIBITED_CONTENT" => Self::ProhibitedContent,
            "SPII" => Self::Spii,
            "MALFORMED_FUNCTION_CALL" => Self::MalformedFunctionCall,
            "TOO_MANY_TOOL_CALLS" => Self::TooManyToolCalls,
            "UNEXPECTED_TOOL_CALL" => Self::UnexpectedToolCall,
            "OTHER" => Self::Other,
            _ => Self::Unknown,
        }
    }

    /// Returns error message if this is an error reason, None if success.
    #[must_use]
    pub fn error_message(self) -> Option<&'static str> {
        match self {
            Self::Stop | Self::MaxTokens | Self::Unknown => None,
            Self::Safety => Some("Content filtered by safety settings"),
            Self::Recitation => Some("Response blocked: recitation"),
            Self::Language => Some("Unsupported language"),
            Self::Blocklist => Some("Content contains blocked terms"),
            Self::ProhibitedContent => Some("Prohibited content detected"),
            Self::Spii => Some("Sensitive PII detected"),
            Self::MalformedFunctionCall => Some("Invalid function call generated"),
            Self::TooManyToolCalls => Some("Too many consecutive tool calls"),
            Self::UnexpectedToolCall => Some("Tool call but no tools enabled"),
            Self::Other => Some("Generation stopped: unknown reason"),
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Stop | Self::MaxTokens)
    }
}

/// `files/*` resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResource {
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

/// Body returned by the upload finalize step.
#[derive(Debug, Deserialize)]
pub struct FileEnvelope {
    pub file: FileResource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountTokensResponse {
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedContent {
    pub name: String,
    pub expire_time: Option<String>,
}
