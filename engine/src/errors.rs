//! Error types for session operations.
//!
//! Every error here is shown to the user as a status line; none is fatal.

use std::time::Duration;

use gemdesk_context::{RegistryError, ShelfError};
use gemdesk_providers::ProviderError;
use gemdesk_tools::{ChartError, NormalizeError};
use gemdesk_utils::ValidationError;
use thiserror::Error;

/// Why a conversation turn was aborted. History is left unchanged.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("{0}")]
    Generation(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Response timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// The worker task panicked or was dropped before reporting.
    #[error("Turn worker stopped: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Shelf(#[from] ShelfError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("A response is already being generated")]
    TurnInFlight,
    #[error(transparent)]
    Turn(#[from] TurnError),
    #[error("No chart to export")]
    NoChart,
    #[error(transparent)]
    Chart(#[from] ChartError),
}

/// Annotation published for a failed turn.
#[must_use]
pub fn format_generation_error(err: &TurnError) -> String {
    format!("❌ Error: {err}")
}
