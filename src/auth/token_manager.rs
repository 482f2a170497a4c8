//! Access token maintenance.
//!
//! [`TokenManager::ensure_fresh_token`] is called before every provider
//! session. A token that is missing, expired, or within the refresh skew of
//! expiry is exchanged for a new one and the rotated credentials are
//! persisted before the session starts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::{AuthError, Result};
use crate::domain::{AccountId, EmailAccount, ProviderKind};

/// Refresh tokens this far ahead of their expiry.
const DEFAULT_REFRESH_SKEW_MINUTES: i64 = 5;

/// Token endpoint response after a refresh or code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Present only when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
    pub expires_in: Option<std::time::Duration>,
}

/// Exchanges a refresh token for a new access token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, provider: ProviderKind, refresh_token: &str) -> Result<RefreshedToken>;
}

/// Persists rotated credentials.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    async fn save_tokens(
        &self,
        account_id: &AccountId,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// Keeps account access tokens valid.
pub struct TokenManager<R: TokenRefresher, S: TokenStorage> {
    refresher: R,
    storage: Arc<S>,
    skew: Duration,
}

impl<R: TokenRefresher, S: TokenStorage> TokenManager<R, S> {
    /// Creates a manager with the default five-minute refresh skew.
    pub fn new(refresher: R, storage: Arc<S>) -> Self {
        Self {
            refresher,
            storage,
            skew: Duration::minutes(DEFAULT_REFRESH_SKEW_MINUTES),
        }
    }

    /// Overrides how early tokens are refreshed.
    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Returns the account with a usable access token, refreshing and
    /// persisting new credentials when needed.
    ///
    /// A refresh response without a refresh token keeps the existing one.
    pub async fn ensure_fresh_token(&self, account: &EmailAccount) -> Result<EmailAccount> {
        let now = Utc::now();
        if !account.token_needs_refresh(now, self.skew) {
            debug!(account_id = %account.id, "access token still valid");
            return Ok(account.clone());
        }

        let refresh_token = account
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::MissingRefreshToken(account.id.clone()))?;

        let refreshed = self
            .refresher
            .refresh(account.provider, refresh_token)
            .await
            .map_err(|e| {
                warn!(account_id = %account.id, error = %e, "token refresh failed");
                e
            })?;

        let refresh_token = refreshed
            .refresh_token
            .or_else(|| account.refresh_token.clone());
        let expires_at = refreshed
            .expires_in
            .and_then(|d| Duration::from_std(d).ok())
            .map(|d| now + d);

        self.storage
            .save_tokens(
                &account.id,
                &refreshed.access_token,
                refresh_token.as_deref(),
                expires_at,
            )
            .await?;

        info!(
            account_id = %account.id,
            provider = %account.provider,
            expires_at = ?expires_at,
            "refreshed access token"
        );

        let mut updated = account.clone();
        updated.access_token = Some(refreshed.access_token);
        updated.refresh_token = refresh_token;
        updated.token_expires_at = expires_at;
        Ok(updated)
    }
}
