//! Newsletter persistence.
//!
//! Writes go through `INSERT ... ON CONFLICT DO NOTHING` against the
//! `(email_account_id, message_id)` unique key, so two syncs racing on the
//! same account cannot import a message twice.

use std::collections::HashSet;

use rusqlite::{params, params_from_iter, Row};

use super::{parse_timestamp, to_timestamp};
use crate::domain::{AccountId, MessageId, Newsletter, NewsletterId, UserId};
use crate::storage::database::{Database, Result};

/// Inserts a newsletter unless one already exists for the same account and
/// message id.
///
/// Returns `true` if a row was written.
pub async fn insert_if_absent(db: &Database, newsletter: &Newsletter) -> Result<bool> {
    let nl = newsletter.clone();

    db.with_conn(move |conn| {
        let inserted = conn.execute(
            r#"
            INSERT INTO newsletters (
                id, user_id, email_account_id, message_id, sender, sender_email,
                subject, content, html_content, received_at, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11
            )
            ON CONFLICT(email_account_id, message_id) DO NOTHING
            "#,
            params![
                nl.id.0,
                nl.user_id.0,
                nl.email_account_id.0,
                nl.message_id.0,
                nl.sender,
                nl.sender_email,
                nl.subject,
                nl.content,
                nl.html_content,
                to_timestamp(nl.received_at),
                to_timestamp(nl.created_at),
            ],
        )?;
        Ok(inserted > 0)
    })
    .await
}

/// Checks whether a message has already been imported for an account.
pub async fn exists(db: &Database, account_id: &AccountId, message_id: &MessageId) -> Result<bool> {
    let account_id = account_id.clone();
    let message_id = message_id.clone();

    db.with_conn(move |conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM newsletters WHERE email_account_id = ?1 AND message_id = ?2",
            [&account_id.0, &message_id.0],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    })
    .await
}

/// Ids per `IN (...)` lookup, well under SQLite's bound-parameter limit.
const LOOKUP_CHUNK: usize = 500;

/// Returns the subset of `message_ids` already imported for an account.
pub async fn existing_message_ids(
    db: &Database,
    account_id: &AccountId,
    message_ids: &[MessageId],
) -> Result<HashSet<MessageId>> {
    if message_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let account_id = account_id.clone();
    let message_ids = message_ids.to_vec();

    db.with_conn(move |conn| {
        let mut found = HashSet::new();
        for chunk in message_ids.chunks(LOOKUP_CHUNK) {
            let placeholders = (0..chunk.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT message_id FROM newsletters \
                 WHERE email_account_id = ?1 AND message_id IN ({placeholders})"
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let params = std::iter::once(account_id.0.as_str())
                .chain(chunk.iter().map(|id| id.0.as_str()));
            let rows = stmt.query_map(params_from_iter(params), |row| row.get::<_, String>(0))?;
            for row in rows {
                found.insert(MessageId(row?));
            }
        }
        Ok(found)
    })
    .await
}

/// Lists an account's newsletters, newest first.
pub async fn list_by_account(
    db: &Database,
    account_id: &AccountId,
    limit: u32,
    offset: u32,
) -> Result<Vec<Newsletter>> {
    let account_id = account_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT
                id, user_id, email_account_id, message_id, sender, sender_email,
                subject, content, html_content, received_at, created_at
            FROM newsletters
            WHERE email_account_id = ?1
            ORDER BY received_at DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )?;

        let rows = stmt.query_map(params![account_id.0, limit, offset], row_to_newsletter)?;
        let newsletters: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(newsletters?)
    })
    .await
}

/// Counts an account's imported newsletters.
pub async fn count_by_account(db: &Database, account_id: &AccountId) -> Result<u32> {
    let account_id = account_id.clone();

    db.with_conn(move |conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM newsletters WHERE email_account_id = ?1",
            [&account_id.0],
            |row| row.get(0),
        )?;
        Ok(count)
    })
    .await
}

/// Moves every newsletter from one account to another.
///
/// Rows whose message id already exists under the target account are
/// dropped. Returns the number of rows moved.
pub async fn reassign_account(db: &Database, from: &AccountId, to: &AccountId) -> Result<usize> {
    let from = from.clone();
    let to = to.clone();

    db.transaction(move |tx| {
        let moved = tx.execute(
            "UPDATE OR IGNORE newsletters SET email_account_id = ?1 WHERE email_account_id = ?2",
            [&to.0, &from.0],
        )?;
        tx.execute(
            "DELETE FROM newsletters WHERE email_account_id = ?1",
            [&from.0],
        )?;
        Ok(moved)
    })
    .await
}

/// Deletes every newsletter belonging to an account.
pub async fn delete_by_account(db: &Database, account_id: &AccountId) -> Result<usize> {
    let account_id = account_id.clone();

    db.with_conn(move |conn| {
        let deleted = conn.execute(
            "DELETE FROM newsletters WHERE email_account_id = ?1",
            [&account_id.0],
        )?;
        Ok(deleted)
    })
    .await
}

fn row_to_newsletter(row: &Row<'_>) -> std::result::Result<Newsletter, rusqlite::Error> {
    Ok(Newsletter {
        id: NewsletterId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        email_account_id: AccountId(row.get(2)?),
        message_id: MessageId(row.get(3)?),
        sender: row.get(4)?,
        sender_email: row.get(5)?,
        subject: row.get(6)?,
        content: row.get(7)?,
        html_content: row.get(8)?,
        received_at: parse_timestamp(row, 9)?,
        created_at: parse_timestamp(row, 10)?,
    })
}
