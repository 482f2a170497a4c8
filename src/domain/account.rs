//! Email account domain types.
//!
//! An [`EmailAccount`] is a connected Gmail or Outlook mailbox together with
//! its OAuth credential state and sync bookkeeping.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, UserId};

/// A mailbox connected through OAuth.
///
/// Token fields are mutated only by the token manager; `last_synced_at` only
/// by the sync orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAccount {
    /// Unique identifier for this account.
    pub id: AccountId,
    /// Owner of the account.
    pub user_id: UserId,
    /// Mailbox address, used for display and logging.
    pub email: String,
    /// Which provider hosts the mailbox.
    pub provider: ProviderKind,
    /// Current OAuth access token.
    pub access_token: Option<String>,
    /// OAuth refresh token used to mint new access tokens.
    pub refresh_token: Option<String>,
    /// When the access token stops being valid.
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Start of the next commit sync's search window. Usually the start
    /// time of the last commit sync; earlier when messages were held back.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Whether scheduled syncs may run for this account.
    pub sync_enabled: bool,
    /// Whether imported newsletters are relabelled/moved at the provider.
    pub newsletter_mode: bool,
}

impl EmailAccount {
    /// Creates an account with no credentials and no sync history.
    pub fn new(
        id: impl Into<AccountId>,
        user_id: impl Into<UserId>,
        email: impl Into<String>,
        provider: ProviderKind,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            email: email.into(),
            provider,
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
            last_synced_at: None,
            sync_enabled: true,
            newsletter_mode: false,
        }
    }

    /// Returns true when the access token is missing, expired, or expires
    /// within `skew` of `now`.
    pub fn token_needs_refresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        if self.access_token.is_none() {
            return true;
        }
        match self.token_expires_at {
            Some(expires_at) => expires_at <= now + skew,
            None => true,
        }
    }
}

/// Mail provider hosting an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gmail REST API.
    Gmail,
    /// Microsoft Graph (Outlook / Microsoft 365).
    Outlook,
}

impl ProviderKind {
    /// Stable lowercase name used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gmail => "gmail",
            ProviderKind::Outlook => "outlook",
        }
    }

    /// Parses the stored name back into a provider kind.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "gmail" => Some(ProviderKind::Gmail),
            "outlook" => Some(ProviderKind::Outlook),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
