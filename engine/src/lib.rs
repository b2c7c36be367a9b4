//! Session engine for GemDesk: the shelf-backed chat session.
//!
//! This crate ties the context layer to a conversation:
//! - [`commands`]: slash-command dispatch and analysis presets
//! - [`session`]: the single-owner [`SessionState`] and the turn permit
//! - [`conversation`]: building, streaming and committing one turn
//! - [`config`]: `~/.gemdesk/config.toml`
//!
//! [`ChatSession`] is the façade a front end drives. Every operation
//! validates its input before any remote call, and a failed operation never
//! leaves the session half-mutated.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use gemdesk_context::{FileRegistry, TokenBudgetTracker};
use gemdesk_providers::{FileUpload, ModelProvider};
use gemdesk_tools::{
    ChartRenderer, DefaultNormalizer, DefaultThumbnailer, FormatNormalizer, NormalizeError,
    NormalizedFile, RenderedChart, SvgChartRenderer, ThumbnailGenerator, chart_tool_definition,
};
use gemdesk_types::{ThinkingLevel, ToolDefinition, mime_for_name};
use gemdesk_utils::{validate_file_extension, validate_file_path, validate_message, validate_url};

pub mod commands;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod session;

pub use commands::{DispatchResult, HELP_TEXT, Preset, dispatch};
pub use config::{ConfigError, GemdeskConfig};
pub use conversation::{TurnEvent, TurnOutcome};
pub use errors::{SessionError, TurnError};
pub use gemdesk_context::{CacheStatus, Shelf, ShelfGroup};
pub use session::{BudgetReading, SessionSettings, SessionState, TurnPermit};

/// The external collaborators a session delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub normalizer: Arc<dyn FormatNormalizer>,
    pub thumbnailer: Arc<dyn ThumbnailGenerator>,
    pub renderer: Arc<dyn ChartRenderer>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Default implementations, using whatever converters are installed.
    pub fn detect() -> Result<Self, NormalizeError> {
        Ok(Self {
            normalizer: Arc::new(DefaultNormalizer::new()?),
            thumbnailer: Arc::new(DefaultThumbnailer::detect()),
            renderer: Arc::new(SvgChartRenderer::default()),
        })
    }
}

/// Result of putting a file or link on the shelf.
#[derive(Debug, Clone, PartialEq)]
pub struct AddOutcome {
    pub display_name: String,
    pub token_count: u64,
    pub cache: CacheStatus,
    pub budget: BudgetReading,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveOutcome {
    pub display_name: String,
    pub cache: CacheStatus,
    pub budget: BudgetReading,
}

/// What a line of user input led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Help(&'static str),
    UnknownCommand(String),
    Completed(TurnOutcome),
}

pub struct ChatSession {
    provider: Arc<dyn ModelProvider>,
    collaborators: Collaborators,
    registry: FileRegistry,
    budget: TokenBudgetTracker,
    chart_tool: ToolDefinition,
    turn_timeout: Duration,
    state: SessionState,
    /// Most recent rendered chart, kept until exported or discarded.
    last_chart: Option<RenderedChart>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("state", &self.state)
            .field("turn_timeout", &self.turn_timeout)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    #[must_use]
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        settings: SessionSettings,
        collaborators: Collaborators,
    ) -> Self {
        let chart_tool = chart_tool_definition();
        Self {
            registry: FileRegistry::new(Arc::clone(&provider), settings.poll),
            budget: TokenBudgetTracker::new(settings.max_context_tokens),
            state: SessionState::new(&settings, vec![chart_tool.clone()]),
            turn_timeout: settings.turn_timeout,
            chart_tool,
            provider,
            collaborators,
            last_chart: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn shelf(&self) -> &Shelf {
        self.state.shelf()
    }

    #[must_use]
    pub fn budget(&self) -> BudgetReading {
        self.state.budget()
    }

    #[must_use]
    pub fn cache_status(&self) -> &CacheStatus {
        self.state.cache_status()
    }

    pub fn set_thinking_level(&mut self, level: ThinkingLevel) {
        self.state.set_thinking_level(level);
    }

    pub fn set_search_grounding(&mut self, enabled: bool) {
        self.state.set_search_grounding(enabled);
    }

    /// Flip search grounding and return the new setting.
    pub fn toggle_search_grounding(&mut self) -> bool {
        let enabled = !self.state.search_grounding();
        self.state.set_search_grounding(enabled);
        enabled
    }

    /// Validate, normalize, upload and shelve a local file.
    pub async fn add_file(&mut self, path: &Path) -> Result<AddOutcome, SessionError> {
        validate_file_path(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        validate_file_extension(&name)?;
        self.state.shelf().check_capacity(1)?;

        let normalized = self.collaborators.normalizer.normalize(path, &name).await?;
        self.ingest(normalized).await
    }

    /// Validate a URL, then download the file it names or scrape the page.
    pub async fn add_url(&mut self, raw: &str) -> Result<AddOutcome, SessionError> {
        let url = validate_url(raw)?;
        self.state.shelf().check_capacity(1)?;

        let normalized = self.collaborators.normalizer.normalize_url(&url).await?;
        self.ingest(normalized).await
    }

    async fn ingest(&mut self, normalized: NormalizedFile) -> Result<AddOutcome, SessionError> {
        let display_name = normalized.display_name().to_string();
        let thumbnail = match normalized.preview_source() {
            Some(source) => {
                self.collaborators
                    .thumbnailer
                    .thumbnail(source, mime_for_name(&display_name))
                    .await
            }
            None => None,
        };

        let upload = FileUpload {
            bytes: normalized.read_payload().await?,
            mime_type: normalized.mime_type().to_string(),
            display_name: display_name.clone(),
        };
        let file = self.registry.upload(upload, &display_name, thumbnail).await?;
        // Temp artifacts go away here, whatever happens next.
        drop(normalized);

        let token_count = file.token_count();
        let cache = self.state.add_file(self.provider.as_ref(), file).await?;
        let budget = self.refresh_budget().await;
        Ok(AddOutcome {
            display_name,
            token_count,
            cache,
            budget,
        })
    }

    pub async fn remove_file(&mut self, index: usize) -> Result<RemoveOutcome, SessionError> {
        let (removed, cache) = self
            .state
            .remove_file(self.provider.as_ref(), index)
            .await?;
        let budget = self.refresh_budget().await;
        Ok(RemoveOutcome {
            display_name: removed.display_name().to_string(),
            cache,
            budget,
        })
    }

    /// Re-estimate the next request's size. Counting failures degrade to a
    /// file count.
    pub async fn refresh_budget(&mut self) -> BudgetReading {
        let reading = match self
            .budget
            .estimate(
                self.provider.as_ref(),
                self.state.history(),
                self.state.shelf(),
                commands::DEFAULT_PREAMBLE,
            )
            .await
        {
            Ok(budget) => BudgetReading::Estimate(budget),
            Err(_) => BudgetReading::Unavailable {
                files: self.state.shelf().len(),
            },
        };
        self.state.set_budget(reading);
        reading
    }

    /// Handle one line of user input.
    ///
    /// Help and unknown commands return without a model call. A chat turn
    /// runs on a worker task that publishes on `events`; the history is
    /// updated here only when the turn succeeds.
    pub async fn send(
        &mut self,
        raw: &str,
        events: mpsc::Sender<TurnEvent>,
    ) -> Result<SendOutcome, SessionError> {
        let text = validate_message(raw)?;
        let (preset, query) = match dispatch(&text) {
            DispatchResult::Passthrough(query) => (None, query),
            DispatchResult::PresetActive { preset, query } => (Some(preset), query),
            DispatchResult::ShowHelp => return Ok(SendOutcome::Help(HELP_TEXT)),
            DispatchResult::UnknownCommand(token) => {
                return Ok(SendOutcome::UnknownCommand(token));
            }
        };
        self.state.check_rate(Instant::now())?;

        let (job, ticket) = conversation::prepare(
            &self.state,
            preset,
            query,
            &self.chart_tool,
            self.turn_timeout,
        )?;
        let worker = tokio::spawn(job.run(
            Arc::clone(&self.provider),
            Arc::clone(&self.collaborators.renderer),
            events.clone(),
        ));

        let outcome = match worker.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => return Err(err.into()),
            Err(join_err) => {
                let err = TurnError::Worker(join_err.to_string());
                let _ = events
                    .send(TurnEvent::Failed(errors::format_generation_error(&err)))
                    .await;
                return Err(err.into());
            }
        };

        ticket.commit(&mut self.state, &outcome);
        if let Some(chart) = &outcome.chart {
            self.last_chart = Some(chart.clone());
        }
        self.refresh_budget().await;
        Ok(SendOutcome::Completed(outcome))
    }

    #[must_use]
    pub fn last_chart(&self) -> Option<&RenderedChart> {
        self.last_chart.as_ref()
    }

    pub fn discard_chart(&mut self) -> Option<RenderedChart> {
        self.last_chart.take()
    }

    /// Write the last chart into `dir` under a fresh timestamped name.
    pub fn export_chart(&self, dir: &Path) -> Result<PathBuf, SessionError> {
        let chart = self.last_chart.as_ref().ok_or(SessionError::NoChart)?;
        Ok(chart.export_to_dir(dir)?)
    }

    pub fn export_chart_to(&self, path: &Path) -> Result<(), SessionError> {
        let chart = self.last_chart.as_ref().ok_or(SessionError::NoChart)?;
        chart.export(path)?;
        Ok(())
    }

    /// Delete the provider-side cache before exit.
    pub async fn shutdown(&mut self) {
        self.state.release_cache(self.provider.as_ref()).await;
    }
}

#[cfg(test)]
mod tests;
