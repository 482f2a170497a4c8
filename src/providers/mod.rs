//! Mail provider adapters.
//!
//! This module contains the [`MailProvider`] trait and its implementations:
//!
//! - [`GmailAdapter`] - Gmail REST API
//! - [`OutlookAdapter`] - Microsoft Graph
//!
//! # Architecture
//!
//! Each adapter handles:
//!
//! - Provider-native search (Gmail search syntax, OData filters) with paging
//! - Fetching and normalizing messages into [`CandidateMessage`](crate::domain::CandidateMessage)
//! - Filing imported newsletters under a label or folder
//!
//! Adapters are built per sync by a [`ProviderFactory`] once the access
//! token is known to be fresh.

mod gmail;
mod http;
mod outlook;
#[cfg(test)]
mod test_server;
mod traits;

use std::sync::Arc;

pub use gmail::GmailAdapter;
pub use outlook::OutlookAdapter;
pub use traits::{
    MailProvider, ProviderError, ProviderFactory, QueryFailure, Result, SearchOutcome,
};

use crate::config::SyncSettings;
use crate::domain::{EmailAccount, ProviderKind};

/// Per-adapter knobs shared by both providers.
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Overrides the API base URL (used against local test servers).
    pub base_url: Option<String>,
    /// Name of the label (Gmail) or folder (Outlook) newsletters are filed under.
    pub label_name: String,
    /// Upper bound on ids returned by a single query.
    pub max_results_per_query: usize,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            label_name: "Newsletters".to_string(),
            max_results_per_query: 100,
        }
    }
}

impl From<&SyncSettings> for AdapterOptions {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            base_url: None,
            label_name: settings.newsletter_label.clone(),
            max_results_per_query: settings.max_results_per_query,
        }
    }
}

/// Builds real HTTP adapters, sharing one connection pool.
#[derive(Debug, Clone)]
pub struct HttpProviderFactory {
    client: reqwest::Client,
    options: AdapterOptions,
}

impl HttpProviderFactory {
    pub fn new(options: AdapterOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            options,
        }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, account: &EmailAccount, access_token: &str) -> Result<Arc<dyn MailProvider>> {
        if access_token.is_empty() {
            return Err(ProviderError::Authentication(format!(
                "no access token for account {}",
                account.id
            )));
        }

        let provider: Arc<dyn MailProvider> = match account.provider {
            ProviderKind::Gmail => Arc::new(GmailAdapter::new(
                self.client.clone(),
                access_token,
                self.options.clone(),
            )),
            ProviderKind::Outlook => Arc::new(OutlookAdapter::new(
                self.client.clone(),
                access_token,
                self.options.clone(),
            )),
        };
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_picks_adapter_by_provider() {
        let factory = HttpProviderFactory::new(AdapterOptions::default());

        let gmail = EmailAccount::new("a1", "u1", "me@gmail.com", ProviderKind::Gmail);
        let outlook = EmailAccount::new("a2", "u1", "me@outlook.com", ProviderKind::Outlook);

        assert_eq!(factory.create(&gmail, "tok").unwrap().kind(), ProviderKind::Gmail);
        assert_eq!(factory.create(&outlook, "tok").unwrap().kind(), ProviderKind::Outlook);
    }

    #[test]
    fn factory_rejects_empty_token() {
        let factory = HttpProviderFactory::new(AdapterOptions::default());
        let account = EmailAccount::new("a1", "u1", "me@gmail.com", ProviderKind::Gmail);

        assert!(matches!(
            factory.create(&account, ""),
            Err(ProviderError::Authentication(_))
        ));
    }

    #[test]
    fn options_from_sync_settings() {
        let mut settings = SyncSettings::default();
        settings.newsletter_label = "Reading".to_string();
        settings.max_results_per_query = 25;

        let options = AdapterOptions::from(&settings);
        assert_eq!(options.label_name, "Reading");
        assert_eq!(options.max_results_per_query, 25);
        assert!(options.base_url.is_none());
    }
}
