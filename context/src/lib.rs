//! Session context: what the model sees on every turn.
//!
//! This crate provides:
//! - Remote file registry (upload, ingestion polling, per-file token count)
//! - The shelf of ingested files and its category grouping
//! - The provider-side context cache, rebuilt whenever the shelf changes
//! - Token budget estimates against the model's context window
//!
//! # Architecture
//!
//! ```text
//! FileRegistry ──upload──> UploadedFile ──add──> Shelf
//!                                                  │
//!                         ContextCacheManager <────┤ rebuild on every mutation
//!                         TokenBudgetTracker  <────┘ estimate after every change
//! ```

mod budget;
mod cache;
mod registry;
mod shelf;

pub use budget::{
    DEFAULT_MAX_CONTEXT_TOKENS, Preamble, TokenBudgetTracker, TokenEstimateUnavailable,
    compose_budget_contents,
};
pub use cache::{CacheSettings, CacheStatus, ContextCacheManager, DEFAULT_CACHE_TTL};
pub use registry::{FileRegistry, PollPolicy, RegistryError};
pub use shelf::{DEFAULT_MAX_FILES, Shelf, ShelfError, ShelfFingerprint, ShelfGroup};
