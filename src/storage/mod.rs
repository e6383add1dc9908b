//! `SQLite` persistence for users, sessions, tasks, notes, and turns.
//!
//! All stores share one [`tokio_rusqlite::Connection`] handle; every call
//! runs on the connection's worker thread via `conn.call`. UUIDs are stored
//! as TEXT and timestamps as epoch milliseconds.

pub mod notes;
pub mod tasks;
pub mod turns;
pub mod users;

pub use notes::NoteStore;
pub use tasks::TaskStore;
pub use turns::TurnStore;
pub use users::{SessionLookup, SessionStore, UserStore};

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use tokio_rusqlite::Connection;

use crate::core::errors::AppResult;
use crate::core::models::{Role, TaskStatus};

/// Shared database handle. Cheap to clone; all clones talk to the same
/// worker thread.
#[derive(Clone)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: &Path) -> AppResult<Self> {
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    /// Open an in-memory database. Used by tests.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub async fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> AppResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 CREATE TABLE IF NOT EXISTS users (
                     id TEXT PRIMARY KEY,
                     name TEXT NOT NULL,
                     email TEXT NOT NULL UNIQUE,
                     password_hash TEXT NOT NULL,
                     created_at INTEGER NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS sessions (
                     token_hash TEXT PRIMARY KEY,
                     user_id TEXT NOT NULL,
                     created_at INTEGER NOT NULL,
                     expires_at INTEGER NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS tasks (
                     id TEXT PRIMARY KEY,
                     owner TEXT NOT NULL,
                     title TEXT NOT NULL,
                     description TEXT NOT NULL DEFAULT '',
                     status TEXT NOT NULL,
                     created_at INTEGER NOT NULL,
                     updated_at INTEGER NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner, created_at);
                 CREATE TABLE IF NOT EXISTS notes (
                     id TEXT PRIMARY KEY,
                     owner TEXT NOT NULL,
                     title TEXT NOT NULL,
                     content TEXT NOT NULL,
                     created_at INTEGER NOT NULL,
                     updated_at INTEGER NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_notes_owner ON notes(owner, created_at);
                 CREATE TABLE IF NOT EXISTS turns (
                     id TEXT PRIMARY KEY,
                     owner TEXT NOT NULL,
                     role TEXT NOT NULL,
                     content TEXT NOT NULL DEFAULT '',
                     tool_calls TEXT,
                     metadata TEXT,
                     created_at INTEGER NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_turns_owner ON turns(owner, created_at);",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// User store over this database.
    #[must_use]
    pub fn users(&self) -> UserStore {
        UserStore::new(self.conn.clone())
    }

    /// Session store over this database.
    #[must_use]
    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.conn.clone())
    }

    /// Task store over this database.
    #[must_use]
    pub fn tasks(&self) -> TaskStore {
        TaskStore::new(self.conn.clone())
    }

    /// Note store over this database.
    #[must_use]
    pub fn notes(&self) -> NoteStore {
        NoteStore::new(self.conn.clone())
    }

    /// Turn store over this database.
    #[must_use]
    pub fn turns(&self) -> TurnStore {
        TurnStore::new(self.conn.clone())
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(Value::Text(self.as_str().to_owned())))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s).ok_or(FromSqlError::InvalidType)
    }
}

impl ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(Value::Text(self.as_str().to_owned())))
    }
}

impl FromSql for TaskStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s).ok_or(FromSqlError::InvalidType)
    }
}

/// Convert a stored epoch-milliseconds column back to a timestamp.
pub(crate) fn millis_to_datetime(ms: i64) -> tokio_rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        tokio_rusqlite::Error::Other(format!("timestamp out of range: {ms}").into())
    })
}
