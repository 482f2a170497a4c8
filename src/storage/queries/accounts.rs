//! Email account CRUD operations.
//!
//! Provides database operations for connected mailboxes and their OAuth
//! credential state.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_optional_timestamp, to_timestamp};
use crate::domain::{AccountId, EmailAccount, ProviderKind, UserId};
use crate::storage::database::{Database, Result};

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, user_id, email, provider, access_token, refresh_token,
        token_expires_at, last_synced_at, sync_enabled, newsletter_mode
    FROM email_accounts
"#;

/// Inserts a new account into the database.
pub async fn insert(db: &Database, account: &EmailAccount) -> Result<()> {
    let account = account.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO email_accounts (
                id, user_id, email, provider, access_token, refresh_token,
                token_expires_at, last_synced_at, sync_enabled, newsletter_mode,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12
            )
            "#,
            params![
                account.id.0,
                account.user_id.0,
                account.email,
                account.provider.as_str(),
                account.access_token,
                account.refresh_token,
                account.token_expires_at.map(to_timestamp),
                account.last_synced_at.map(to_timestamp),
                account.sync_enabled as i32,
                account.newsletter_mode as i32,
                now,
                now,
            ],
        )?;

        Ok(())
    })
    .await
}

/// Retrieves an account by its ID.
pub async fn get_by_id(db: &Database, account_id: &AccountId) -> Result<Option<EmailAccount>> {
    let account_id = account_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
        let result = stmt.query_row([&account_id.0], row_to_account).optional()?;
        Ok(result)
    })
    .await
}

/// Retrieves all accounts.
pub async fn get_all(db: &Database) -> Result<Vec<EmailAccount>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY email"))?;
        let rows = stmt.query_map([], row_to_account)?;
        let accounts: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(accounts?)
    })
    .await
}

/// Stores refreshed OAuth tokens.
pub async fn update_tokens(
    db: &Database,
    account_id: &AccountId,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let account_id = account_id.clone();
    let access_token = access_token.to_string();
    let refresh_token = refresh_token.map(|s| s.to_string());

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            UPDATE email_accounts
            SET access_token = ?1, refresh_token = ?2, token_expires_at = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                access_token,
                refresh_token,
                expires_at.map(to_timestamp),
                now,
                account_id.0
            ],
        )?;
        Ok(())
    })
    .await
}

/// Records the completion time of a commit sync.
pub async fn set_last_synced(
    db: &Database,
    account_id: &AccountId,
    synced_at: DateTime<Utc>,
) -> Result<()> {
    let account_id = account_id.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE email_accounts SET last_synced_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![to_timestamp(synced_at), now, account_id.0],
        )?;
        Ok(())
    })
    .await
}

/// Turns provider-side relabelling on or off.
pub async fn set_newsletter_mode(
    db: &Database,
    account_id: &AccountId,
    enabled: bool,
) -> Result<()> {
    let account_id = account_id.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE email_accounts SET newsletter_mode = ?1, updated_at = ?2 WHERE id = ?3",
            params![enabled as i32, now, account_id.0],
        )?;
        Ok(())
    })
    .await
}

/// Deletes an account.
///
/// Newsletters referencing the account must be reassigned or deleted first;
/// otherwise the foreign key rejects the delete.
pub async fn delete(db: &Database, account_id: &AccountId) -> Result<()> {
    let account_id = account_id.clone();

    db.with_conn(move |conn| {
        conn.execute("DELETE FROM email_accounts WHERE id = ?1", [&account_id.0])?;
        Ok(())
    })
    .await
}

fn row_to_account(row: &Row<'_>) -> std::result::Result<EmailAccount, rusqlite::Error> {
    let provider_str: String = row.get(3)?;
    let provider = ProviderKind::parse(&provider_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown provider: {provider_str}").into(),
        )
    })?;

    Ok(EmailAccount {
        id: AccountId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        email: row.get(2)?,
        provider,
        access_token: row.get(4)?,
        refresh_token: row.get(5)?,
        token_expires_at: parse_optional_timestamp(row, 6)?,
        last_synced_at: parse_optional_timestamp(row, 7)?,
        sync_enabled: row.get::<_, i32>(8)? != 0,
        newsletter_mode: row.get::<_, i32>(9)? != 0,
    })
}
