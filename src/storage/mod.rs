//! Database storage.
//!
//! This module provides the storage layer for letterbox, including:
//!
//! - SQLite database for connected accounts and imported newsletters
//! - Async-safe database operations via tokio::task::spawn_blocking
//! - Implementations of the service storage traits over the query modules

mod database;
pub mod queries;
mod schema;

pub use database::{Database, DatabaseError, Result};

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::{self, AuthError, TokenStorage};
use crate::domain::{AccountId, EmailAccount, MessageId, Newsletter};
use crate::services::{self, NewsletterError, NewsletterStorage, SyncError, SyncStorage};

/// Storage layer over the SQLite database.
///
/// This is the main entry point for storage operations.
#[derive(Debug, Clone)]
pub struct StorageLayer {
    db: Database,
}

impl StorageLayer {
    /// Creates a new storage layer with the given database path.
    pub async fn new(db_path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = Database::open(db_path).await?;
        Ok(Self { db })
    }

    /// Creates a storage layer with an in-memory database for testing.
    pub async fn in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self { db })
    }

    /// Returns a reference to the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Wraps the storage layer in an Arc for shared ownership.
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

fn sync_err(e: DatabaseError) -> SyncError {
    SyncError::Storage(e.to_string())
}

fn newsletter_err(e: DatabaseError) -> NewsletterError {
    NewsletterError::Storage(e.to_string())
}

#[async_trait]
impl SyncStorage for StorageLayer {
    async fn get_account(&self, id: &AccountId) -> services::Result<Option<EmailAccount>> {
        queries::accounts::get_by_id(&self.db, id)
            .await
            .map_err(sync_err)
    }

    async fn existing_message_ids(
        &self,
        account_id: &AccountId,
        ids: &[MessageId],
    ) -> services::Result<HashSet<MessageId>> {
        queries::newsletters::existing_message_ids(&self.db, account_id, ids)
            .await
            .map_err(sync_err)
    }

    async fn insert_newsletter(&self, newsletter: &Newsletter) -> services::Result<bool> {
        queries::newsletters::insert_if_absent(&self.db, newsletter)
            .await
            .map_err(sync_err)
    }

    async fn set_last_synced(
        &self,
        account_id: &AccountId,
        at: DateTime<Utc>,
    ) -> services::Result<()> {
        queries::accounts::set_last_synced(&self.db, account_id, at)
            .await
            .map_err(sync_err)
    }
}

#[async_trait]
impl TokenStorage for StorageLayer {
    async fn save_tokens(
        &self,
        account_id: &AccountId,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> auth::Result<()> {
        queries::accounts::update_tokens(
            &self.db,
            account_id,
            access_token,
            refresh_token,
            expires_at,
        )
        .await
        .map_err(|e| AuthError::Storage(e.to_string()))
    }
}

#[async_trait]
impl NewsletterStorage for StorageLayer {
    async fn account_exists(&self, id: &AccountId) -> services::NewsletterResult<bool> {
        queries::accounts::get_by_id(&self.db, id)
            .await
            .map(|account| account.is_some())
            .map_err(newsletter_err)
    }

    async fn list_newsletters(
        &self,
        account_id: &AccountId,
        limit: u32,
        offset: u32,
    ) -> services::NewsletterResult<Vec<Newsletter>> {
        queries::newsletters::list_by_account(&self.db, account_id, limit, offset)
            .await
            .map_err(newsletter_err)
    }

    async fn count_newsletters(&self, account_id: &AccountId) -> services::NewsletterResult<u32> {
        queries::newsletters::count_by_account(&self.db, account_id)
            .await
            .map_err(newsletter_err)
    }

    async fn reassign_newsletters(
        &self,
        from: &AccountId,
        to: &AccountId,
    ) -> services::NewsletterResult<usize> {
        queries::newsletters::reassign_account(&self.db, from, to)
            .await
            .map_err(newsletter_err)
    }

    async fn delete_newsletters(&self, account_id: &AccountId) -> services::NewsletterResult<usize> {
        queries::newsletters::delete_by_account(&self.db, account_id)
            .await
            .map_err(newsletter_err)
    }

    async fn delete_account(&self, account_id: &AccountId) -> services::NewsletterResult<()> {
        queries::accounts::delete(&self.db, account_id)
            .await
            .map_err(newsletter_err)
    }
}
