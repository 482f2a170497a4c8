//! SQL schema definitions as const strings.
//!
//! Contains the complete SQLite schema for connected accounts and imported
//! newsletters. Timestamps are stored as RFC 3339 text.

/// SQL to create the email_accounts table.
pub const CREATE_EMAIL_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS email_accounts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    email TEXT NOT NULL,
    provider TEXT NOT NULL,
    access_token TEXT,
    refresh_token TEXT,
    token_expires_at TEXT,
    last_synced_at TEXT,
    sync_enabled INTEGER NOT NULL DEFAULT 1,
    newsletter_mode INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create account indexes.
pub const CREATE_EMAIL_ACCOUNT_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_email_accounts_user ON email_accounts(user_id)
"#;

/// SQL to create the newsletters table.
///
/// The unique constraint is the import dedup key.
pub const CREATE_NEWSLETTERS: &str = r#"
CREATE TABLE IF NOT EXISTS newsletters (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    email_account_id TEXT NOT NULL REFERENCES email_accounts(id),
    message_id TEXT NOT NULL,
    sender TEXT NOT NULL,
    sender_email TEXT NOT NULL,
    subject TEXT NOT NULL,
    content TEXT NOT NULL,
    html_content TEXT,
    received_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (email_account_id, message_id)
)
"#;

/// SQL to create newsletter indexes.
pub const CREATE_NEWSLETTER_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_newsletters_user ON newsletters(user_id);
CREATE INDEX IF NOT EXISTS idx_newsletters_received ON newsletters(email_account_id, received_at DESC);
CREATE INDEX IF NOT EXISTS idx_newsletters_sender ON newsletters(sender_email)
"#;

/// Schema version recorded in `PRAGMA user_version` once migrations ran.
pub const SCHEMA_VERSION: i32 = 1;

/// Returns all schema creation statements in order.
pub fn all_migrations() -> Vec<&'static str> {
    vec![
        CREATE_EMAIL_ACCOUNTS,
        CREATE_EMAIL_ACCOUNT_INDEXES,
        CREATE_NEWSLETTERS,
        CREATE_NEWSLETTER_INDEXES,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn migrations_apply_cleanly_twice() {
        let conn = Connection::open_in_memory().unwrap();
        for _ in 0..2 {
            for migration in all_migrations() {
                conn.execute_batch(migration).unwrap();
            }
        }
    }

    #[test]
    fn newsletters_are_unique_per_account_and_message() {
        let conn = Connection::open_in_memory().unwrap();
        for migration in all_migrations() {
            conn.execute_batch(migration).unwrap();
        }

        conn.execute(
            "INSERT INTO email_accounts (id, user_id, email, provider, created_at, updated_at)
             VALUES ('a1', 'u1', 'me@example.com', 'gmail', 'now', 'now')",
            [],
        )
        .unwrap();

        let insert = "INSERT INTO newsletters (id, user_id, email_account_id, message_id, sender,
                      sender_email, subject, content, received_at, created_at)
                      VALUES (?1, 'u1', 'a1', 'm1', 's', 's@x.com', 'sub', 'c', 'now', 'now')";
        conn.execute(insert, ["n1"]).unwrap();
        assert!(conn.execute(insert, ["n2"]).is_err());
    }
}
