//! Token budget estimate for the next request.

use gemdesk_providers::{ModelProvider, ProviderError};
use gemdesk_types::{Content, ConversationTurn, Role, TokenBudget};
use thiserror::Error;

use crate::shelf::Shelf;

pub const DEFAULT_MAX_CONTEXT_TOKENS: u64 = 1_000_000;

#[derive(Debug, Error)]
#[error("Token estimate unavailable: {0}")]
pub struct TokenEstimateUnavailable(#[from] pub ProviderError);

/// Instruction and acknowledgement sent ahead of the history on every turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble<'a> {
    pub instruction: &'a str,
    pub acknowledgement: &'a str,
}

impl Preamble<'_> {
    #[must_use]
    pub fn contents(&self) -> [Content; 2] {
        [
            Content::text(Role::User, self.instruction),
            Content::text(Role::Model, self.acknowledgement),
        ]
    }
}

/// Preamble pair, full history, then one user turn holding every shelf file.
#[must_use]
pub fn compose_budget_contents(
    history: &[ConversationTurn],
    shelf: &Shelf,
    preamble: Preamble<'_>,
) -> Vec<Content> {
    let mut contents = Vec::with_capacity(history.len() + 3);
    contents.extend(preamble.contents());
    contents.extend(history.iter().map(Content::from));
    if !shelf.is_empty() {
        contents.push(Content::files(Role::User, shelf.file_refs()));
    }
    contents
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudgetTracker {
    max_tokens: u64,
}

impl Default for TokenBudgetTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTEXT_TOKENS)
    }
}

impl TokenBudgetTracker {
    #[must_use]
    pub fn new(max_tokens: u64) -> Self {
        Self { max_tokens }
    }

    #[must_use]
    pub fn max_tokens(&self) -> u64 {
        self.max_tokens
    }

    /// Ask the provider how large the next request would be.
    ///
    /// Best effort: one count call, no retries beyond the transport policy.
    pub async fn estimate(
        &self,
        provider: &dyn ModelProvider,
        history: &[ConversationTurn],
        shelf: &Shelf,
        preamble: Preamble<'_>,
    ) -> Result<TokenBudget, TokenEstimateUnavailable> {
        let contents = compose_budget_contents(history, shelf, preamble);
        let used = provider.count_tokens(&contents).await.inspect_err(|e| {
            tracing::warn!(%e, "Token counting error");
        })?;
        let budget = TokenBudget::new(used, self.max_tokens);
        tracing::debug!(used, max = self.max_tokens, band = budget.band().as_str(), "Token budget");
        Ok(budget)
    }
}
