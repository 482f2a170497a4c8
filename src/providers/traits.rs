//! Mail provider trait definition.
//!
//! This module defines the [`MailProvider`] trait which abstracts over the
//! Gmail REST API and Microsoft Graph. The sync service only ever talks to
//! this trait, so tests can drive it with an in-memory fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::{CandidateMessage, EmailAccount, MessageId, ProviderKind};

/// Result type alias for mail provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur during mail provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Authentication failed or credentials expired.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying, if known.
        retry_after_secs: Option<u64>,
    },

    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request or parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Provider-specific error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A search query that failed while the others kept running.
#[derive(Debug)]
pub struct QueryFailure {
    /// The provider-native query text.
    pub query: String,
    /// Why it failed.
    pub error: ProviderError,
}

/// Union of the ids returned by a batch of queries.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    /// Deduplicated candidate ids; a message matching several queries appears once.
    pub ids: BTreeSet<MessageId>,
    /// Queries that failed and were skipped.
    pub failures: Vec<QueryFailure>,
}

/// Trait for mail provider implementations.
///
/// Implementations translate provider payloads into [`CandidateMessage`]s
/// and never leak provider SDK types to callers.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Returns the kind of this provider.
    fn kind(&self) -> ProviderKind;

    /// Runs one provider-native query restricted to messages received since `since`.
    ///
    /// Follows pagination up to the adapter's per-query result limit.
    async fn search(&self, query: &str, since: DateTime<Utc>) -> Result<Vec<MessageId>>;

    /// Runs every query and unions the resulting ids.
    ///
    /// A failing query is logged and recorded in
    /// [`SearchOutcome::failures`]; the remaining queries still run.
    async fn search_all(&self, queries: &[String], since: DateTime<Utc>) -> SearchOutcome {
        let mut outcome = SearchOutcome::default();

        for query in queries {
            match self.search(query, since).await {
                Ok(ids) => {
                    tracing::debug!(query = %query, found = ids.len(), "search query completed");
                    outcome.ids.extend(ids);
                }
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "search query failed, skipping");
                    outcome.failures.push(QueryFailure {
                        query: query.clone(),
                        error: e,
                    });
                }
            }
        }

        outcome
    }

    /// Fetches a message and normalizes it into a [`CandidateMessage`].
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] if the message does not exist.
    async fn fetch(&self, id: &MessageId) -> Result<CandidateMessage>;

    /// Files the message under the newsletter label or folder.
    async fn relabel(&self, id: &MessageId) -> Result<()>;
}

/// Creates provider adapters for accounts.
///
/// Called after the token manager has produced a fresh access token.
pub trait ProviderFactory: Send + Sync {
    /// Builds an adapter for `account` using `access_token`.
    fn create(&self, account: &EmailAccount, access_token: &str) -> Result<Arc<dyn MailProvider>>;
}
