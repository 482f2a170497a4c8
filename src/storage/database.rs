//! Database connection and initialization.
//!
//! A single SQLite connection behind an async mutex. Every call hops onto the
//! blocking pool, so query functions can be plain synchronous rusqlite code.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::Mutex;

use super::schema::{self, SCHEMA_VERSION};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The database was written by a newer letterbox.
    #[error("database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// The blocking task running a database call panicked or was cancelled.
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Thread-safe database connection wrapper.
///
/// Uses a Mutex to ensure only one operation accesses the connection at a time.
/// All operations are run via `spawn_blocking` to avoid blocking the async runtime.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens a database at the given path, creating it and its parent
    /// directories if necessary, then brings the schema up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&path)?;
            configure(&conn, true)?;
            Ok(conn)
        })
        .await??;

        Self::from_connection(conn).await
    }

    /// Opens an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection> {
            let conn = Connection::open_in_memory()?;
            configure(&conn, false)?;
            Ok(conn)
        })
        .await??;

        Self::from_connection(conn).await
    }

    async fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_blocking(migrate).await?;
        Ok(db)
    }

    /// Returns the schema version recorded in the database file.
    pub async fn schema_version(&self) -> Result<i32> {
        self.with_conn(|conn| Ok(user_version(conn)?)).await
    }

    /// Executes a function with access to the database connection.
    ///
    /// The function runs in a blocking task to avoid blocking the async runtime.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run_blocking(move |conn| f(conn)).await
    }

    /// Executes a transaction with the given function.
    ///
    /// The transaction is committed on success and rolled back on error.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run_blocking(move |conn| {
            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn run_blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await?
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

/// Per-connection pragmas. WAL only applies to on-disk files.
fn configure(conn: &Connection, on_disk: bool) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    if on_disk {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
    }
    Ok(())
}

fn user_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Applies the schema and stamps its version. Statements are idempotent, so
/// older files are simply brought forward.
fn migrate(conn: &mut Connection) -> Result<()> {
    let found = user_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(DatabaseError::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    let tx = conn.transaction()?;
    for migration in schema::all_migrations() {
        tx.execute_batch(migration)?;
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    if found < SCHEMA_VERSION {
        tracing::info!(from = found, to = SCHEMA_VERSION, "Migrated database schema");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSERT_ACCOUNT: &str =
        "INSERT INTO email_accounts (id, user_id, email, provider, created_at, updated_at)
         VALUES ('a1', 'u1', 'me@example.com', 'gmail', 'now', 'now')";

    async fn count_accounts(db: &Database) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM email_accounts", [], |row| row.get(0))?)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn open_in_memory_creates_schema() {
        let db = Database::open_in_memory().await.unwrap();

        let tables: Vec<String> = db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
            })
            .await
            .unwrap();

        assert_eq!(tables, vec!["email_accounts".to_string(), "newsletters".to_string()]);
        assert_eq!(db.schema_version().await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn open_on_disk_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("letterbox.db");

        let db = Database::open(&path).await.unwrap();
        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM newsletters", [], |row| row.get(0))?)
            })
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn reopening_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("letterbox.db");

        {
            let db = Database::open(&path).await.unwrap();
            db.with_conn(|conn| {
                conn.execute(INSERT_ACCOUNT, [])?;
                Ok(())
            })
            .await
            .unwrap();
        }

        let db = Database::open(&path).await.unwrap();
        assert_eq!(count_accounts(&db).await, 1);
        assert_eq!(db.schema_version().await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn unversioned_file_is_brought_forward() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("letterbox.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(schema::CREATE_EMAIL_ACCOUNTS).unwrap();
            conn.execute(INSERT_ACCOUNT, []).unwrap();
        }

        let db = Database::open(&path).await.unwrap();

        assert_eq!(db.schema_version().await.unwrap(), SCHEMA_VERSION);
        assert_eq!(count_accounts(&db).await, 1);
    }

    #[tokio::test]
    async fn newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("letterbox.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
                .unwrap();
        }

        let err = Database::open(&path).await.unwrap_err();

        assert!(matches!(
            err,
            DatabaseError::UnsupportedSchema { found, supported }
                if found == SCHEMA_VERSION + 1 && supported == SCHEMA_VERSION
        ));
    }

    #[tokio::test]
    async fn panicking_call_reports_task_failure() {
        let db = Database::open_in_memory().await.unwrap();

        let err = db
            .with_conn(|_| -> Result<()> { panic!("query closure panicked") })
            .await
            .unwrap_err();

        assert!(matches!(err, DatabaseError::Task(_)));
        assert!(err.to_string().starts_with("database task failed"));
        // The connection is still usable afterwards.
        assert_eq!(count_accounts(&db).await, 0);
    }

    #[tokio::test]
    async fn transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().await.unwrap();

        let result: Result<()> = db
            .transaction(|tx| {
                tx.execute(INSERT_ACCOUNT, [])?;
                Err(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(count_accounts(&db).await, 0);
    }

    #[tokio::test]
    async fn database_is_clone() {
        let db1 = Database::open_in_memory().await.unwrap();
        let db2 = db1.clone();

        db1.transaction(|tx| {
            tx.execute(
                "INSERT INTO email_accounts (id, user_id, email, provider, created_at, updated_at)
                 VALUES ('a1', 'u1', 'me@example.com', 'outlook', 'now', 'now')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let provider: String = db2
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT provider FROM email_accounts WHERE id = 'a1'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();

        assert_eq!(provider, "outlook");
    }
}
