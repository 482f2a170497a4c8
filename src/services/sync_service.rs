//! Newsletter sync orchestration.
//!
//! The [`SyncService`] drives one sync for one account:
//!
//! ```text
//! load account -> ensure fresh token -> build provider adapter
//!     -> run every search query, union ids
//!     -> fetch in chunks (concurrent within a chunk, paused between chunks)
//!     -> classify
//!     -> preview: group by domain      commit: threshold, allow-list,
//!                                              insert-if-absent, relabel
//! ```
//!
//! Only account-level failures (unknown account, token refresh, provider
//! construction) abort a call. A failing query, message fetch, insert or
//! relabel is logged, recorded in the [`SyncReport`], and skipped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::DomainPreviewBuilder;
use crate::auth::{AuthError, TokenManager, TokenRefresher, TokenStorage};
use crate::classifier::Classifier;
use crate::config::SyncSettings;
use crate::domain::{
    AccountId, CandidateMessage, ClassificationResult, DomainPreview, EmailAccount, MessageId,
    Newsletter, ProviderKind,
};
use crate::providers::{self, MailProvider, ProviderError, ProviderFactory};

/// Account-level failures that abort a sync call.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No account with the given id.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// The access token could not be refreshed; reconnect or retry later.
    #[error("token refresh failed: {0}")]
    TokenRefresh(#[source] AuthError),

    /// The provider adapter could not be built.
    #[error("provider unavailable: {0}")]
    Provider(#[source] ProviderError),

    /// Account state could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Kind of a non-fatal, per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// One search query failed; the others still ran.
    ProviderSearch,
    /// One message could not be fetched and was skipped.
    ProviderFetch,
    /// One accepted message could not be stored.
    Persistence,
    /// An imported message could not be relabelled at the provider.
    Relabel,
}

/// A skipped query or message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub kind: FailureKind,
    /// Query text or message id.
    pub context: String,
    pub reason: String,
}

/// Outcome of a commit sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Distinct ids returned by all search queries.
    pub candidates_found: usize,
    /// Messages fetched and classified.
    pub fetched: usize,
    /// Messages that passed the threshold and the allow-list.
    pub accepted: usize,
    /// Newsletters newly written.
    pub imported: usize,
    /// Candidates already imported, whether skipped before fetching or at insert.
    pub duplicates_skipped: usize,
    pub below_threshold: usize,
    pub outside_allow_list: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    fn record(&mut self, kind: FailureKind, context: impl Into<String>, reason: impl ToString) {
        self.failures.push(SyncFailure {
            kind,
            context: context.into(),
            reason: reason.to_string(),
        });
    }

    /// Failures of one kind.
    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &SyncFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }
}

/// Storage used by the sync service.
#[async_trait]
pub trait SyncStorage: Send + Sync {
    /// Loads an account.
    async fn get_account(&self, id: &AccountId) -> Result<Option<EmailAccount>>;

    /// Returns which of `ids` already have a newsletter row for the account.
    async fn existing_message_ids(
        &self,
        account_id: &AccountId,
        ids: &[MessageId],
    ) -> Result<HashSet<MessageId>>;

    /// Inserts a newsletter unless its `(account, message)` pair exists.
    /// Returns `true` if a row was written.
    async fn insert_newsletter(&self, newsletter: &Newsletter) -> Result<bool>;

    /// Records where the next commit sync's search window starts: the start
    /// time of this sync, or earlier when messages were held back.
    async fn set_last_synced(&self, account_id: &AccountId, at: DateTime<Utc>) -> Result<()>;
}

/// Per-call state once the account is authenticated.
struct Session {
    account: EmailAccount,
    provider: Arc<dyn MailProvider>,
    started_at: DateTime<Utc>,
}

struct Discovery {
    ids: Vec<MessageId>,
    /// Start of the search window that was used.
    since: DateTime<Utc>,
    /// False when every configured query failed.
    searched: bool,
}

/// Where the next commit sync's search window starts.
///
/// Messages skipped for a reason that can go away (a failed fetch or
/// insert, a domain not accepted yet) must stay inside the window. A failed
/// fetch has no known date, so the current window is kept as is.
fn next_window_start(
    since: DateTime<Utc>,
    started_at: DateTime<Utc>,
    earliest_skipped: Option<DateTime<Utc>>,
    fetch_failed: bool,
) -> DateTime<Utc> {
    if fetch_failed {
        return since;
    }
    match earliest_skipped {
        // Gmail's `after:` is exclusive at second precision.
        Some(date) => date
            .checked_sub_signed(chrono::Duration::seconds(1))
            .unwrap_or(date)
            .max(since)
            .min(started_at),
        None => started_at,
    }
}

fn earliest(current: Option<DateTime<Utc>>, date: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(current.map_or(date, |c| c.min(date)))
}

/// Orchestrates preview and commit syncs.
///
/// # Example
///
/// ```ignore
/// let service = SyncService::new(storage, oauth_clients, factory, classifier, settings.sync);
///
/// let previews = service.preview_newsletters(&account_id).await?;
/// let domains: Vec<String> = previews.iter().map(|p| p.domain.clone()).collect();
/// let imported = service.sync_newsletters(&account_id, Some(domains.as_slice())).await?;
/// ```
pub struct SyncService<S, R>
where
    S: SyncStorage + TokenStorage,
    R: TokenRefresher,
{
    storage: Arc<S>,
    tokens: TokenManager<R, S>,
    providers: Arc<dyn ProviderFactory>,
    classifier: Classifier,
    settings: SyncSettings,
}

impl<S, R> SyncService<S, R>
where
    S: SyncStorage + TokenStorage,
    R: TokenRefresher,
{
    pub fn new(
        storage: Arc<S>,
        refresher: R,
        providers: Arc<dyn ProviderFactory>,
        classifier: Classifier,
        settings: SyncSettings,
    ) -> Self {
        Self {
            tokens: TokenManager::new(refresher, Arc::clone(&storage)),
            storage,
            providers,
            classifier,
            settings,
        }
    }

    /// Returns the sync settings in use.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Scores a single message. Exposed for diagnostics.
    pub fn classify(&self, message: &CandidateMessage) -> ClassificationResult {
        self.classifier.classify(message)
    }

    /// Runs search, fetch and classify without persisting anything, and
    /// groups candidates that reach the preview threshold by sender domain.
    pub async fn preview_newsletters(&self, account_id: &AccountId) -> Result<Vec<DomainPreview>> {
        let session = self.open_session(account_id).await?;
        let mut report = SyncReport::default();

        let discovery = self.discover(&session, &mut report).await;
        let classified = self
            .fetch_and_classify(session.provider.as_ref(), &discovery.ids, &mut report)
            .await;

        let threshold = self.settings.preview_threshold;
        let mut builder = DomainPreviewBuilder::new();
        for (message, result) in classified {
            if result.is_accepted(threshold) {
                builder.push(&message, result);
            } else {
                report.below_threshold += 1;
            }
        }
        let previews = builder.build();

        info!(
            account_id = %account_id,
            candidates = report.candidates_found,
            fetched = report.fetched,
            domains = previews.len(),
            failures = report.failures.len(),
            "newsletter preview finished"
        );

        Ok(previews)
    }

    /// Imports newsletters and returns how many rows were newly written.
    ///
    /// See [`sync_newsletters_report`](Self::sync_newsletters_report).
    pub async fn sync_newsletters(
        &self,
        account_id: &AccountId,
        accepted_domains: Option<&[String]>,
    ) -> Result<usize> {
        self.sync_newsletters_report(account_id, accepted_domains)
            .await
            .map(|report| report.imported)
    }

    /// Imports newsletters and returns the full report.
    ///
    /// With `accepted_domains`, only senders whose domain is in the list are
    /// imported and the preview threshold applies, so every domain the user
    /// picked from a preview can actually be imported. Without it the stricter
    /// commit threshold applies.
    ///
    /// Re-running on an unchanged mailbox imports nothing new.
    pub async fn sync_newsletters_report(
        &self,
        account_id: &AccountId,
        accepted_domains: Option<&[String]>,
    ) -> Result<SyncReport> {
        let session = self.open_session(account_id).await?;
        let account = &session.account;
        let mut report = SyncReport::default();

        info!(
            account_id = %account.id,
            provider = %account.provider,
            allow_list = accepted_domains.map(|d| d.len()),
            "starting newsletter sync"
        );

        let discovery = self.discover(&session, &mut report).await;

        let already_imported = match self
            .storage
            .existing_message_ids(&account.id, &discovery.ids)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(account_id = %account.id, error = %e, "could not check for imported messages");
                HashSet::new()
            }
        };
        report.duplicates_skipped += already_imported.len();
        let to_fetch: Vec<MessageId> = discovery
            .ids
            .into_iter()
            .filter(|id| !already_imported.contains(id))
            .collect();

        let classified = self
            .fetch_and_classify(session.provider.as_ref(), &to_fetch, &mut report)
            .await;

        let allow_list: Option<HashSet<String>> = accepted_domains.map(|domains| {
            domains
                .iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect()
        });
        let threshold = if allow_list.is_some() {
            self.settings.preview_threshold
        } else {
            self.settings.commit_threshold
        };

        let mut imported = Vec::new();
        let mut earliest_skipped = None;
        for (message, result) in classified {
            if !result.is_accepted(threshold) {
                report.below_threshold += 1;
                continue;
            }
            if let Some(allowed) = &allow_list {
                let in_list = message
                    .sender_domain()
                    .is_some_and(|domain| allowed.contains(&domain));
                if !in_list {
                    debug!(message_id = %message.id, from = %message.from_address, "sender domain not accepted");
                    report.outside_allow_list += 1;
                    earliest_skipped = earliest(earliest_skipped, message.date);
                    continue;
                }
            }
            report.accepted += 1;

            let newsletter =
                Newsletter::from_candidate(&account.user_id, &account.id, &message, Utc::now());
            match self.storage.insert_newsletter(&newsletter).await {
                Ok(true) => {
                    report.imported += 1;
                    imported.push(message.id);
                }
                Ok(false) => {
                    debug!(message_id = %message.id, "newsletter already imported");
                    report.duplicates_skipped += 1;
                }
                Err(e) => {
                    warn!(
                        account_id = %account.id,
                        message_id = %message.id,
                        error = %e,
                        "failed to store newsletter, skipping"
                    );
                    report.record(FailureKind::Persistence, message.id.as_str(), e);
                    earliest_skipped = earliest(earliest_skipped, message.date);
                }
            }
        }

        if account.newsletter_mode {
            self.relabel_all(session.provider.as_ref(), &imported, &mut report)
                .await;
        }

        if discovery.searched {
            let fetch_failed = report.failures_of(FailureKind::ProviderFetch).next().is_some();
            let window_start = next_window_start(
                discovery.since,
                session.started_at,
                earliest_skipped,
                fetch_failed,
            );
            if window_start < session.started_at {
                info!(
                    account_id = %account.id,
                    window_start = %window_start,
                    "keeping skipped messages inside the next search window"
                );
            }
            if let Err(e) = self
                .storage
                .set_last_synced(&account.id, window_start)
                .await
            {
                warn!(account_id = %account.id, error = %e, "failed to record sync time");
                report.record(FailureKind::Persistence, account.id.as_str(), e);
            }
        } else {
            warn!(account_id = %account.id, "every search query failed, keeping previous sync time");
        }

        info!(
            account_id = %account.id,
            candidates = report.candidates_found,
            fetched = report.fetched,
            accepted = report.accepted,
            imported = report.imported,
            duplicates = report.duplicates_skipped,
            failures = report.failures.len(),
            "newsletter sync finished"
        );

        Ok(report)
    }

    async fn open_session(&self, account_id: &AccountId) -> Result<Session> {
        let started_at = Utc::now();

        let account = self
            .storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| SyncError::AccountNotFound(account_id.clone()))?;

        let account = self
            .tokens
            .ensure_fresh_token(&account)
            .await
            .map_err(SyncError::TokenRefresh)?;

        let access_token = account.access_token.as_deref().ok_or_else(|| {
            SyncError::Provider(ProviderError::Authentication(
                "no access token after refresh".to_string(),
            ))
        })?;
        let provider = self
            .providers
            .create(&account, access_token)
            .map_err(SyncError::Provider)?;

        Ok(Session {
            account,
            provider,
            started_at,
        })
    }

    async fn discover(&self, session: &Session, report: &mut SyncReport) -> Discovery {
        let queries = match session.account.provider {
            ProviderKind::Gmail => &self.settings.gmail_queries,
            ProviderKind::Outlook => &self.settings.outlook_filters,
        };
        let since = session
            .account
            .last_synced_at
            .unwrap_or_else(|| self.initial_window_start(session.started_at));

        let outcome = session.provider.search_all(queries, since).await;
        let searched = queries.is_empty() || outcome.failures.len() < queries.len();

        for failure in outcome.failures {
            report.record(FailureKind::ProviderSearch, failure.query, failure.error);
        }
        report.candidates_found = outcome.ids.len();

        debug!(
            account_id = %session.account.id,
            since = %since,
            queries = queries.len(),
            candidates = outcome.ids.len(),
            "search finished"
        );

        Discovery {
            ids: outcome.ids.into_iter().collect(),
            since,
            searched,
        }
    }

    /// Window start for an account that has never synced. Out-of-range
    /// lookbacks fall back to the Unix epoch.
    fn initial_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::try_days(self.settings.initial_lookback_days.max(0))
            .and_then(|lookback| now.checked_sub_signed(lookback))
            .filter(|start| start.timestamp() >= 0)
            .unwrap_or_default()
    }

    async fn fetch_and_classify(
        &self,
        provider: &dyn MailProvider,
        ids: &[MessageId],
        report: &mut SyncReport,
    ) -> Vec<(CandidateMessage, ClassificationResult)> {
        let batch_size = self.settings.batch_size.max(1);
        let delay = Duration::from_millis(self.settings.batch_delay_ms);
        let chunks = ids.len().div_ceil(batch_size);
        let mut classified = Vec::with_capacity(ids.len());

        for (index, chunk) in ids.chunks(batch_size).enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let results = join_all(chunk.iter().map(|id| self.fetch_with_retry(provider, id))).await;

            for (id, result) in chunk.iter().zip(results) {
                match result {
                    Ok(message) => {
                        report.fetched += 1;
                        let verdict = self.classifier.classify(&message);
                        classified.push((message, verdict));
                    }
                    Err(e) => {
                        warn!(message_id = %id, error = %e, "failed to fetch message, skipping");
                        report.record(FailureKind::ProviderFetch, id.as_str(), e);
                    }
                }
            }

            debug!(chunk = index + 1, chunks, size = chunk.len(), "fetched chunk");
        }

        classified
    }

    /// Fetches a message, retrying once after a rate-limit response.
    async fn fetch_with_retry(
        &self,
        provider: &dyn MailProvider,
        id: &MessageId,
    ) -> providers::Result<CandidateMessage> {
        match provider.fetch(id).await {
            Err(ProviderError::RateLimited { retry_after_secs }) => {
                let wait = retry_after_secs
                    .unwrap_or(1)
                    .min(self.settings.max_retry_after_secs);
                debug!(message_id = %id, wait_secs = wait, "rate limited, retrying fetch");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                provider.fetch(id).await
            }
            other => other,
        }
    }

    async fn relabel_all(
        &self,
        provider: &dyn MailProvider,
        ids: &[MessageId],
        report: &mut SyncReport,
    ) {
        for id in ids {
            if let Err(e) = provider.relabel(id).await {
                warn!(message_id = %id, error = %e, "failed to relabel newsletter");
                report.record(FailureKind::Relabel, id.as_str(), e);
            }
        }
    }
}
