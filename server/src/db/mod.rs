//! Relational persistence on SQLite.
//!
//! [`connect`] opens the pool and applies the embedded migrations in
//! `server/migrations`. Uniqueness of email, username and mobile number is
//! enforced by the schema, so two concurrent registrations for the same email
//! cannot both succeed; the loser gets [`StoreError::Conflict`]. The same goes
//! for a second chat between one pair of users.
//!
//! The auth core only sees the [`UserStore`] trait. Events and chats are plain
//! repositories over the same pool.

mod chats;
mod events;
mod users;

use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::info;

pub use chats::{ChatOpened, ChatRepository};
pub use events::{AttendOutcome, EventRepository};
pub use users::{SqlUserStore, UserStore};

/// How long a request waits for a pooled connection before failing.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on pooled connections.
const MAX_CONNECTIONS: u32 = 8;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors returned by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row matched the key.
    #[error("record not found")]
    NotFound,

    /// A unique column already holds this value. Carries the column name.
    #[error("{0} already in use")]
    Conflict(&'static str),

    /// Anything else the database reported.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Maps a failed write to [`StoreError::Conflict`] when it hit a unique index.
pub(crate) fn classify_write_error(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            let field = if message.contains("users.email") {
                "email"
            } else if message.contains("users.username") {
                "username"
            } else if message.contains("users.mobile_number") {
                "mobile_number"
            } else if message.contains("idx_chats_pair") {
                "chat"
            } else {
                "value"
            };
            return StoreError::Conflict(field);
        }
    }
    StoreError::Database(err)
}

/// Turns `RowNotFound` into [`StoreError::NotFound`].
pub(crate) fn classify_read_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Database(other),
    }
}

/// Opens a pool for `url` and runs pending migrations.
pub async fn connect(url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// A migrated in-memory database.
///
/// Every connection to `sqlite::memory:` is its own database, so the pool is
/// pinned to a single connection that never expires.
pub async fn connect_in_memory() -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|err| StoreError::Database(err.into()))?;
    info!(migrations = MIGRATOR.iter().count(), "Database schema up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_database_is_migrated() {
        let pool = connect_in_memory().await.unwrap();
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();

        for table in ["bids", "chats", "event_attendees", "events", "messages", "users"] {
            assert!(names.contains(&table), "missing table {table}");
        }
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(classify_read_error(sqlx::Error::RowNotFound).is_not_found());
        assert!(!classify_read_error(sqlx::Error::PoolTimedOut).is_not_found());
    }
}
