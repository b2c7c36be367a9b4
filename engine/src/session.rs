//! Mutable session state and its single-owner mutators.
//!
//! `SessionState` is owned by one task. Shelf mutations and cache rebuilds
//! take `&mut self`, so they are serialized by the borrow checker. A turn in
//! flight is tracked by [`TurnPermit`]; the permit carries the preset
//! override, so the configured reasoning depth is never written during a turn.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use gemdesk_context::{
    CacheSettings, CacheStatus, ContextCacheManager, DEFAULT_MAX_CONTEXT_TOKENS,
    DEFAULT_MAX_FILES, PollPolicy, Shelf, ShelfError,
};
use gemdesk_providers::ModelProvider;
use gemdesk_types::{ConversationTurn, ThinkingLevel, TokenBudget, ToolDefinition, UploadedFile};
use gemdesk_utils::{DEFAULT_MIN_SEND_INTERVAL, RateLimiter, ValidationError};

use crate::commands::Preset;
use crate::config::DEFAULT_TURN_TIMEOUT;
use crate::errors::SessionError;

/// Tunables for one session, usually read from the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub max_files: usize,
    pub max_context_tokens: u64,
    pub thinking_level: ThinkingLevel,
    pub search_grounding: bool,
    pub min_send_interval: Duration,
    pub cache: CacheSettings,
    pub poll: PollPolicy,
    pub turn_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            thinking_level: ThinkingLevel::default(),
            search_grounding: false,
            min_send_interval: DEFAULT_MIN_SEND_INTERVAL,
            cache: CacheSettings::default(),
            poll: PollPolicy::default(),
            turn_timeout: DEFAULT_TURN_TIMEOUT,
        }
    }
}

/// Last token budget reading shown in the context meter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetReading {
    /// Nothing measured yet.
    Unknown,
    Estimate(TokenBudget),
    /// Counting failed; only the file count is known.
    Unavailable { files: usize },
}

impl BudgetReading {
    #[must_use]
    pub fn budget(&self) -> Option<TokenBudget> {
        match self {
            BudgetReading::Estimate(budget) => Some(*budget),
            _ => None,
        }
    }
}

impl std::fmt::Display for BudgetReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetReading::Unknown => f.write_str("0 tokens"),
            BudgetReading::Estimate(budget) => budget.fmt(f),
            BudgetReading::Unavailable { files } => write!(f, "{files} files loaded"),
        }
    }
}

#[derive(Debug, Default)]
struct TurnSlot {
    in_flight: AtomicBool,
}

/// Proof that a turn is in flight. At most one exists per session.
///
/// Dropping the permit (commit, failure, panic unwinding) frees the slot and
/// with it the preset override.
#[derive(Debug)]
pub struct TurnPermit {
    slot: Arc<TurnSlot>,
    preset: Option<Preset>,
    base_level: ThinkingLevel,
}

impl TurnPermit {
    #[must_use]
    pub fn preset(&self) -> Option<Preset> {
        self.preset
    }

    /// Depth for this turn: the preset's if one is active, else the
    /// session setting captured when the permit was taken.
    #[must_use]
    pub fn thinking_level(&self) -> ThinkingLevel {
        self.preset.map_or(self.base_level, Preset::thinking_level)
    }
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        self.slot.in_flight.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct SessionState {
    shelf: Shelf,
    cache: ContextCacheManager,
    history: Vec<ConversationTurn>,
    thinking_level: ThinkingLevel,
    search_grounding: bool,
    budget: BudgetReading,
    turn_slot: Arc<TurnSlot>,
    rate_limiter: RateLimiter,
}

impl SessionState {
    /// `cached_tools` are stored in every cache this session creates.
    #[must_use]
    pub fn new(settings: &SessionSettings, cached_tools: Vec<ToolDefinition>) -> Self {
        Self {
            shelf: Shelf::new(settings.max_files),
            cache: ContextCacheManager::new(settings.cache, cached_tools),
            history: Vec::new(),
            thinking_level: settings.thinking_level,
            search_grounding: settings.search_grounding,
            budget: BudgetReading::Unknown,
            turn_slot: Arc::new(TurnSlot::default()),
            rate_limiter: RateLimiter::new(settings.min_send_interval),
        }
    }

    #[must_use]
    pub fn shelf(&self) -> &Shelf {
        &self.shelf
    }

    #[must_use]
    pub fn cache(&self) -> &ContextCacheManager {
        &self.cache
    }

    #[must_use]
    pub fn cache_status(&self) -> &CacheStatus {
        self.cache.status()
    }

    #[must_use]
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    #[must_use]
    pub fn thinking_level(&self) -> ThinkingLevel {
        self.thinking_level
    }

    pub fn set_thinking_level(&mut self, level: ThinkingLevel) {
        tracing::info!(level = level.as_str(), "Thinking level changed");
        self.thinking_level = level;
    }

    #[must_use]
    pub fn search_grounding(&self) -> bool {
        self.search_grounding
    }

    pub fn set_search_grounding(&mut self, enabled: bool) {
        tracing::info!(enabled, "Search grounding toggled");
        self.search_grounding = enabled;
    }

    #[must_use]
    pub fn budget(&self) -> BudgetReading {
        self.budget
    }

    pub fn set_budget(&mut self, reading: BudgetReading) {
        self.budget = reading;
    }

    #[must_use]
    pub fn turn_in_flight(&self) -> bool {
        self.turn_slot.in_flight.load(Ordering::Acquire)
    }

    /// Put an ingested file on the shelf and rebuild the cache.
    ///
    /// A full shelf is rejected before anything changes and without a
    /// rebuild.
    pub async fn add_file(
        &mut self,
        provider: &dyn ModelProvider,
        file: UploadedFile,
    ) -> Result<CacheStatus, ShelfError> {
        let name = file.display_name().to_string();
        self.shelf.add(file)?;
        tracing::info!(file = %name, files = self.shelf.len(), "Added to shelf");
        Ok(self.cache.rebuild(provider, &self.shelf).await)
    }

    /// Take a file off the shelf and rebuild the cache.
    pub async fn remove_file(
        &mut self,
        provider: &dyn ModelProvider,
        index: usize,
    ) -> Result<(UploadedFile, CacheStatus), ShelfError> {
        let removed = self.shelf.remove(index)?;
        tracing::info!(file = %removed.display_name(), files = self.shelf.len(), "Removed from shelf");
        let status = self.cache.rebuild(provider, &self.shelf).await;
        Ok((removed, status))
    }

    /// Delete the held cache, e.g. on shutdown.
    pub async fn release_cache(&mut self, provider: &dyn ModelProvider) {
        self.cache.release(provider).await;
    }

    /// Enforce the minimum spacing between sends.
    pub fn check_rate(&mut self, now: Instant) -> Result<(), ValidationError> {
        self.rate_limiter.check(now)
    }

    /// Claim the turn slot. Fails while another permit is alive.
    pub fn acquire_turn(&self, preset: Option<Preset>) -> Result<TurnPermit, SessionError> {
        if self
            .turn_slot
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::TurnInFlight);
        }
        Ok(TurnPermit {
            slot: Arc::clone(&self.turn_slot),
            preset,
            base_level: self.thinking_level,
        })
    }

    /// Append exactly one user turn and one model turn, then release the
    /// permit.
    pub fn commit_turn(&mut self, permit: TurnPermit, user_query: String, model_text: String) {
        self.history.push(ConversationTurn::user(user_query));
        self.history.push(ConversationTurn::model(model_text));
        tracing::debug!(
            turns = self.history.len(),
            preset = permit.preset().map(Preset::label),
            "Turn committed"
        );
        drop(permit);
    }
}
