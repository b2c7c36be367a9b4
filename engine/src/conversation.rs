//! One conversation turn, split across the session owner and a worker task.
//!
//! ```text
//! owner:  prepare ──> (TurnJob, TurnTicket)
//! worker:             TurnJob::run ──TurnEvent──> UI
//!                       ├── stream text deltas
//!                       ├── first generate_chart call -> render
//!                       └── TurnOutcome
//! owner:  TurnTicket::commit(outcome) ──> history += (user, model)
//! ```
//!
//! The job owns everything it needs, so nothing in `SessionState` is borrowed
//! while the model streams. A failed turn never reaches `commit`; dropping the
//! ticket releases the turn slot.

use std::sync::Arc;
use std::time::Duration;

use gemdesk_providers::{GenerateRequest, ModelProvider};
use gemdesk_tools::{CHART_TOOL_NAME, ChartRenderer, RenderedChart, chart_spec_from_call};
use gemdesk_types::{
    Content, Part, ResponseChunk, Role, StreamEvent, ToolCall, ToolDefinition, ToolSpec,
};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::commands::{Preset, preamble_for};
use crate::errors::{SessionError, TurnError, format_generation_error};
use crate::session::{SessionState, TurnPermit};

/// Model text committed when a stream produced nothing.
pub const EMPTY_RESPONSE: &str = "(empty response)";

const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Progress of a turn, published by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// A preset was applied to this turn.
    PresetApplied(Preset),
    TextDelta(String),
    ChartRendering,
    /// A rendered chart, held until the user exports or discards it.
    ChartReady(RenderedChart),
    ChartFailed(String),
    /// Final model text, including any chart annotation.
    Finished { text: String },
    /// Visible error annotation; history is unchanged.
    Failed(String),
}

/// What the worker hands back for commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub text: String,
    pub chart: Option<RenderedChart>,
}

/// Owned request plus deadline; runs on a worker task.
#[derive(Debug)]
pub struct TurnJob {
    request: GenerateRequest,
    preset: Option<Preset>,
    deadline: Duration,
}

/// Owner-side half of a prepared turn.
#[derive(Debug)]
pub struct TurnTicket {
    permit: TurnPermit,
    user_query: String,
}

impl TurnTicket {
    #[must_use]
    pub fn user_query(&self) -> &str {
        &self.user_query
    }

    #[must_use]
    pub fn permit(&self) -> &TurnPermit {
        &self.permit
    }

    /// Record the finished turn. History only ever holds the literal query
    /// and the final text, never preamble or preset prompt.
    pub fn commit(self, state: &mut SessionState, outcome: &TurnOutcome) {
        state.commit_turn(self.permit, self.user_query, outcome.text.clone());
    }
}

/// Claim the turn slot and build the request for `query`.
pub fn prepare(
    state: &SessionState,
    preset: Option<Preset>,
    query: String,
    chart_tool: &ToolDefinition,
    deadline: Duration,
) -> Result<(TurnJob, TurnTicket), SessionError> {
    let permit = state.acquire_turn(preset)?;
    let request = build_request(state, &permit, &query, chart_tool);
    tracing::debug!(
        turns = request.contents.len(),
        cached = request.cached_content.is_some(),
        thinking_level = request.thinking_level.as_str(),
        "Prepared turn"
    );
    Ok((
        TurnJob {
            request,
            preset,
            deadline,
        },
        TurnTicket {
            permit,
            user_query: query,
        },
    ))
}

/// Preamble pair, history, then the user turn.
///
/// A cache valid for the current shelf replaces the inline file references
/// and tool declarations. Search grounding never uses the cache.
#[must_use]
pub fn build_request(
    state: &SessionState,
    permit: &TurnPermit,
    query: &str,
    chart_tool: &ToolDefinition,
) -> GenerateRequest {
    let mut contents = Vec::with_capacity(state.history().len() + 3);
    contents.extend(preamble_for(permit.preset()).contents());
    contents.extend(state.history().iter().map(Content::from));

    let cache = if state.search_grounding() {
        None
    } else {
        state.cache().valid_for(state.shelf())
    };

    match cache {
        Some(handle) => {
            contents.push(Content::text(Role::User, query));
            GenerateRequest {
                contents,
                cached_content: Some(handle.name.clone()),
                tools: Vec::new(),
                thinking_level: permit.thinking_level(),
            }
        }
        None => {
            let mut parts: Vec<Part> = state
                .shelf()
                .file_refs()
                .into_iter()
                .map(Part::File)
                .collect();
            parts.push(Part::Text(query.to_string()));
            contents.push(Content {
                role: Role::User,
                parts,
            });

            let mut tools = vec![ToolSpec::Functions(vec![chart_tool.clone()])];
            if state.search_grounding() {
                tools.push(ToolSpec::GoogleSearch);
            }
            GenerateRequest {
                contents,
                cached_content: None,
                tools,
                thinking_level: permit.thinking_level(),
            }
        }
    }
}

#[derive(Debug, Default)]
struct StreamSummary {
    text: String,
    chart_call: Option<Value>,
    error: Option<String>,
    done: bool,
}

impl StreamSummary {
    fn record_call(&mut self, call: ToolCall) {
        if call.name != CHART_TOOL_NAME {
            tracing::warn!(name = %call.name, "Ignoring call to unknown function");
        } else if self.chart_call.is_some() {
            tracing::warn!("Ignoring additional generate_chart call");
        } else {
            self.chart_call = Some(call.arguments);
        }
    }
}

async fn consume(
    mut rx: mpsc::Receiver<StreamEvent>,
    events: &mpsc::Sender<TurnEvent>,
) -> StreamSummary {
    let mut summary = StreamSummary::default();
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Chunk(ResponseChunk::TextDelta(delta)) => {
                summary.text.push_str(&delta);
                // A closed event channel only means nobody is watching.
                let _ = events.send(TurnEvent::TextDelta(delta)).await;
            }
            StreamEvent::Chunk(ResponseChunk::ToolCall(call)) => summary.record_call(call),
            StreamEvent::Done => {
                summary.done = true;
                break;
            }
            StreamEvent::Error(message) => {
                summary.error = Some(message);
                break;
            }
        }
    }
    summary
}

impl TurnJob {
    #[must_use]
    pub fn request(&self) -> &GenerateRequest {
        &self.request
    }

    /// Stream the response, render a requested chart, and report the
    /// outcome. Failures are also published as [`TurnEvent::Failed`].
    pub async fn run(
        self,
        provider: Arc<dyn ModelProvider>,
        renderer: Arc<dyn ChartRenderer>,
        events: mpsc::Sender<TurnEvent>,
    ) -> Result<TurnOutcome, TurnError> {
        let deadline = self.deadline;
        if let Some(preset) = self.preset {
            let _ = events.send(TurnEvent::PresetApplied(preset)).await;
        }

        let result = match tokio::time::timeout(
            deadline,
            self.stream(provider.as_ref(), renderer.as_ref(), &events),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TurnError::Timeout(deadline)),
        };

        match &result {
            Ok(outcome) => {
                let _ = events
                    .send(TurnEvent::Finished {
                        text: outcome.text.clone(),
                    })
                    .await;
            }
            Err(err) => {
                tracing::warn!(%err, "Turn failed");
                let _ = events.send(TurnEvent::Failed(format_generation_error(err))).await;
            }
        }
        result
    }

    async fn stream(
        &self,
        provider: &dyn ModelProvider,
        renderer: &dyn ChartRenderer,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<TurnOutcome, TurnError> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let (sent, summary) = tokio::join!(
            provider.stream_generate(&self.request, tx),
            consume(rx, events)
        );
        sent?;

        if let Some(message) = summary.error {
            return Err(TurnError::Generation(message));
        }
        if !summary.done {
            return Err(TurnError::Generation(
                "Stream ended without completing".to_string(),
            ));
        }

        let (prefix, chart) = match summary.chart_call {
            Some(args) => render_chart(&args, renderer, events).await,
            None => (String::new(), None),
        };

        let mut text = prefix;
        text.push_str(&summary.text);
        if text.trim().is_empty() {
            text = EMPTY_RESPONSE.to_string();
        }
        Ok(TurnOutcome { text, chart })
    }
}

/// Chart failures become an annotation; the turn still succeeds.
async fn render_chart(
    args: &Value,
    renderer: &dyn ChartRenderer,
    events: &mpsc::Sender<TurnEvent>,
) -> (String, Option<RenderedChart>) {
    let _ = events.send(TurnEvent::ChartRendering).await;
    match chart_spec_from_call(args).and_then(|spec| renderer.render(&spec)) {
        Ok(chart) => {
            tracing::info!(title = chart.title(), "Chart generated");
            let prefix = format!("📊 **Chart Generated: {}**\n\n", chart.title());
            let _ = events.send(TurnEvent::ChartReady(chart.clone())).await;
            (prefix, Some(chart))
        }
        Err(err) => {
            tracing::warn!(%err, "Chart generation failed");
            let _ = events.send(TurnEvent::ChartFailed(err.to_string())).await;
            (format!("❌ Chart generation failed: {err}\n\n"), None)
        }
    }
}
