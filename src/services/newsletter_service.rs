//! Imported newsletter queries and account removal.
//!
//! An account cannot be deleted while newsletters reference it, so
//! [`NewsletterService::remove_account`] first moves its newsletters to
//! another account or deletes them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::domain::{AccountId, Newsletter};

/// Errors that can occur during newsletter operations.
#[derive(Debug, Error)]
pub enum NewsletterError {
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("cannot reassign newsletters of {0} to itself")]
    SameAccount(AccountId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type for newsletter operations.
pub type Result<T> = std::result::Result<T, NewsletterError>;

/// Storage abstraction for newsletter operations.
#[async_trait]
pub trait NewsletterStorage: Send + Sync {
    async fn account_exists(&self, id: &AccountId) -> Result<bool>;

    /// Newest first.
    async fn list_newsletters(
        &self,
        account_id: &AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Newsletter>>;

    async fn count_newsletters(&self, account_id: &AccountId) -> Result<u32>;

    /// Moves newsletters between accounts, dropping ones the target already has.
    async fn reassign_newsletters(&self, from: &AccountId, to: &AccountId) -> Result<usize>;

    async fn delete_newsletters(&self, account_id: &AccountId) -> Result<usize>;

    async fn delete_account(&self, account_id: &AccountId) -> Result<()>;
}

/// What happened to an account's newsletters when it was removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccountRemoval {
    pub reassigned: usize,
    pub deleted: usize,
}

/// Service for reading imported newsletters and removing accounts.
pub struct NewsletterService<S: NewsletterStorage> {
    storage: Arc<S>,
}

impl<S: NewsletterStorage> NewsletterService<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Lists an account's newsletters, newest first.
    pub async fn list(
        &self,
        account_id: &AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Newsletter>> {
        self.storage
            .list_newsletters(account_id, limit, offset)
            .await
    }

    pub async fn count(&self, account_id: &AccountId) -> Result<u32> {
        self.storage.count_newsletters(account_id).await
    }

    /// Deletes an account after reassigning its newsletters to `reassign_to`,
    /// or deleting them when no target is given.
    pub async fn remove_account(
        &self,
        account_id: &AccountId,
        reassign_to: Option<&AccountId>,
    ) -> Result<AccountRemoval> {
        self.require_account(account_id).await?;

        let mut removal = AccountRemoval::default();
        match reassign_to {
            Some(target) if target == account_id => {
                return Err(NewsletterError::SameAccount(account_id.clone()));
            }
            Some(target) => {
                self.require_account(target).await?;
                removal.reassigned = self
                    .storage
                    .reassign_newsletters(account_id, target)
                    .await?;
            }
            None => {
                removal.deleted = self.storage.delete_newsletters(account_id).await?;
            }
        }

        self.storage.delete_account(account_id).await?;

        info!(
            account_id = %account_id,
            reassigned = removal.reassigned,
            deleted = removal.deleted,
            "removed account"
        );

        Ok(removal)
    }

    async fn require_account(&self, id: &AccountId) -> Result<()> {
        if self.storage.account_exists(id).await? {
            Ok(())
        } else {
            Err(NewsletterError::AccountNotFound(id.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, NewsletterId, UserId};
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct MockStorage {
        accounts: Mutex<HashSet<AccountId>>,
        newsletters: Mutex<Vec<Newsletter>>,
    }

    impl MockStorage {
        fn new(accounts: &[&str]) -> Self {
            Self {
                accounts: Mutex::new(accounts.iter().map(|a| AccountId::from(*a)).collect()),
                newsletters: Mutex::new(Vec::new()),
            }
        }

        fn add(&self, account: &str, message: &str, age_days: i64) {
            let received = Utc::now() - Duration::days(age_days);
            self.newsletters.lock().unwrap().push(Newsletter {
                id: NewsletterId(format!("nl-{account}-{message}")),
                user_id: UserId::from("user-1"),
                email_account_id: AccountId::from(account),
                message_id: MessageId::from(message),
                sender: "Sender".to_string(),
                sender_email: "sender@example.com".to_string(),
                subject: message.to_string(),
                content: String::new(),
                html_content: None,
                received_at: received,
                created_at: received,
            });
        }
    }

    #[async_trait]
    impl NewsletterStorage for MockStorage {
        async fn account_exists(&self, id: &AccountId) -> Result<bool> {
            Ok(self.accounts.lock().unwrap().contains(id))
        }

        async fn list_newsletters(
            &self,
            account_id: &AccountId,
            limit: u32,
            offset: u32,
        ) -> Result<Vec<Newsletter>> {
            let mut list: Vec<Newsletter> = self
                .newsletters
                .lock()
                .unwrap()
                .iter()
                .filter(|n| &n.email_account_id == account_id)
                .cloned()
                .collect();
            list.sort_by(|a, b| b.received_at.cmp(&a.received_at));
            Ok(list
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        }

        async fn count_newsletters(&self, account_id: &AccountId) -> Result<u32> {
            let newsletters = self.newsletters.lock().unwrap();
            Ok(newsletters
                .iter()
                .filter(|n| &n.email_account_id == account_id)
                .count() as u32)
        }

        async fn reassign_newsletters(&self, from: &AccountId, to: &AccountId) -> Result<usize> {
            let mut newsletters = self.newsletters.lock().unwrap();
            let taken: HashSet<MessageId> = newsletters
                .iter()
                .filter(|n| &n.email_account_id == to)
                .map(|n| n.message_id.clone())
                .collect();
            let mut moved = 0;
            newsletters.retain_mut(|n| {
                if &n.email_account_id != from {
                    return true;
                }
                if taken.contains(&n.message_id) {
                    return false;
                }
                n.email_account_id = to.clone();
                moved += 1;
                true
            });
            Ok(moved)
        }

        async fn delete_newsletters(&self, account_id: &AccountId) -> Result<usize> {
            let mut newsletters = self.newsletters.lock().unwrap();
            let before = newsletters.len();
            newsletters.retain(|n| &n.email_account_id != account_id);
            Ok(before - newsletters.len())
        }

        async fn delete_account(&self, account_id: &AccountId) -> Result<()> {
            self.accounts.lock().unwrap().remove(account_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn list_and_count() {
        let storage = Arc::new(MockStorage::new(&["acc-1"]));
        storage.add("acc-1", "old", 5);
        storage.add("acc-1", "new", 1);
        storage.add("acc-1", "mid", 3);
        let service = NewsletterService::new(storage);
        let account = AccountId::from("acc-1");

        let page: Vec<String> = service
            .list(&account, 2, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.subject)
            .collect();

        assert_eq!(page, vec!["new", "mid"]);
        assert_eq!(service.count(&account).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn remove_account_deletes_newsletters() {
        let storage = Arc::new(MockStorage::new(&["acc-1"]));
        storage.add("acc-1", "m1", 1);
        storage.add("acc-1", "m2", 2);
        let service = NewsletterService::new(storage.clone());

        let removal = service
            .remove_account(&AccountId::from("acc-1"), None)
            .await
            .unwrap();

        assert_eq!(removal, AccountRemoval { reassigned: 0, deleted: 2 });
        assert!(storage.accounts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_account_reassigns_newsletters() {
        let storage = Arc::new(MockStorage::new(&["acc-1", "acc-2"]));
        storage.add("acc-1", "m1", 1);
        storage.add("acc-1", "m2", 2);
        storage.add("acc-2", "m2", 2);
        let service = NewsletterService::new(storage.clone());
        let target = AccountId::from("acc-2");

        let removal = service
            .remove_account(&AccountId::from("acc-1"), Some(&target))
            .await
            .unwrap();

        assert_eq!(removal.reassigned, 1);
        assert_eq!(service.count(&target).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn remove_account_validates_accounts() {
        let storage = Arc::new(MockStorage::new(&["acc-1"]));
        let service = NewsletterService::new(storage);
        let account = AccountId::from("acc-1");

        let err = service
            .remove_account(&AccountId::from("missing"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, NewsletterError::AccountNotFound(_)));

        let err = service
            .remove_account(&account, Some(&account))
            .await
            .unwrap_err();
        assert!(matches!(err, NewsletterError::SameAccount(_)));

        let err = service
            .remove_account(&account, Some(&AccountId::from("ghost")))
            .await
            .unwrap_err();
        assert!(matches!(err, NewsletterError::AccountNotFound(id) if id.as_str() == "ghost"));
    }
}
