//! Provider-side context cache for the shelf.
//!
//! At most one cache exists per session. It is valid only for the exact shelf
//! it was built from: every shelf mutation deletes it and builds a fresh one.
//!
//! ```text
//! rebuild(shelf)
//!   ├── delete held cache (errors logged, swallowed)
//!   ├── clear reference   (always)
//!   ├── shelf empty  -> Empty
//!   └── create cache -> Active | Restricted | Failed
//! ```

use std::time::Duration;

use gemdesk_providers::{CacheHandle, CacheRequest, ModelProvider, ProviderError};
use gemdesk_types::{Content, Role, ToolDefinition};

use crate::shelf::{Shelf, ShelfFingerprint};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Result of the last rebuild, shown to the user as a status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// Caching turned off in configuration.
    Disabled,
    /// Nothing on the shelf.
    Empty,
    Active { files: usize },
    /// Quota or tier does not allow caching. Files are sent inline instead.
    Restricted(String),
    Failed(String),
}

impl CacheStatus {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, CacheStatus::Active { .. })
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            CacheStatus::Disabled => "Context cache disabled".to_string(),
            CacheStatus::Empty => "Ready.".to_string(),
            CacheStatus::Active { files } => format!("Cache created ({files} files)"),
            CacheStatus::Restricted(_) => {
                "Cache unavailable on this plan; files are sent with each message".to_string()
            }
            CacheStatus::Failed(err) => format!("Cache error: {err}"),
        }
    }
}

#[derive(Debug, Clone)]
struct HeldCache {
    handle: CacheHandle,
    fingerprint: ShelfFingerprint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Owns the session's single cache reference.
#[derive(Debug)]
pub struct ContextCacheManager {
    settings: CacheSettings,
    /// Declarations stored in the cache; requests that reference a cache
    /// cannot carry their own.
    tools: Vec<ToolDefinition>,
    held: Option<HeldCache>,
    status: CacheStatus,
}

impl ContextCacheManager {
    #[must_use]
    pub fn new(settings: CacheSettings, tools: Vec<ToolDefinition>) -> Self {
        let status = if settings.enabled {
            CacheStatus::Empty
        } else {
            CacheStatus::Disabled
        };
        Self {
            settings,
            tools,
            held: None,
            status,
        }
    }

    #[must_use]
    pub fn status(&self) -> &CacheStatus {
        &self.status
    }

    #[must_use]
    pub fn handle(&self) -> Option<&CacheHandle> {
        self.held.as_ref().map(|held| &held.handle)
    }

    /// The held cache if it was built from exactly this shelf and has not
    /// expired.
    #[must_use]
    pub fn valid_for(&self, shelf: &Shelf) -> Option<&CacheHandle> {
        let held = self.held.as_ref()?;
        if held.handle.is_expired() {
            tracing::debug!(name = %held.handle.name, "Held cache expired");
            return None;
        }
        (held.fingerprint == shelf.fingerprint()).then_some(&held.handle)
    }

    /// Replace the held cache with one built from `shelf`.
    ///
    /// Never fails: on return the held reference is either valid for `shelf`
    /// or absent, and the outcome is recorded in [`Self::status`].
    pub async fn rebuild(&mut self, provider: &dyn ModelProvider, shelf: &Shelf) -> CacheStatus {
        self.release(provider).await;

        self.status = if !self.settings.enabled {
            CacheStatus::Disabled
        } else if shelf.is_empty() {
            CacheStatus::Empty
        } else {
            self.create(provider, shelf).await
        };
        self.status.clone()
    }

    /// Delete the held cache, if any. The reference is cleared even when the
    /// delete fails; the provider expires it on its own.
    pub async fn release(&mut self, provider: &dyn ModelProvider) {
        let Some(held) = self.held.take() else {
            return;
        };
        match provider.delete_cache(&held.handle.name).await {
            Ok(()) => tracing::info!(name = %held.handle.name, "Deleted old cache"),
            Err(e) => tracing::warn!(name = %held.handle.name, %e, "Cache deletion error"),
        }
    }

    async fn create(&mut self, provider: &dyn ModelProvider, shelf: &Shelf) -> CacheStatus {
        let request = CacheRequest {
            contents: vec![Content::files(Role::User, shelf.file_refs())],
            tools: self.tools.clone(),
            ttl: self.settings.ttl,
        };

        match provider.create_cache(&request).await {
            Ok(handle) => {
                tracing::info!(name = %handle.name, files = shelf.len(), "Cache created");
                self.held = Some(HeldCache {
                    handle,
                    fingerprint: shelf.fingerprint(),
                });
                CacheStatus::Active { files: shelf.len() }
            }
            Err(e) => classify_failure(&e),
        }
    }
}

fn classify_failure(error: &ProviderError) -> CacheStatus {
    if error.is_quota_restricted() {
        tracing::info!(%error, "Context caching restricted; sending files inline");
        CacheStatus::Restricted(error.to_string())
    } else {
        tracing::warn!(%error, "Cache creation error");
        CacheStatus::Failed(error.to_string())
    }
}
