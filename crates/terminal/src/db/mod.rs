//! Embedded `SQLite` storage for the terminal.
//!
//! # Databases
//!
//! - `pricecheck.db` - the durable catalog store ([`catalog`])
//!   - `products` - product records keyed by barcode
//!   - `device_info` - small key/value table holding the device identity
//! - `pricecheck-cache.db` - cached asset responses, owned by the cache proxy
//!
//! Both files are opened independently by whichever component needs them; there
//! is no shared connection between the catalog store and the proxy.
//!
//! # Schema evolution
//!
//! Tables are created with `CREATE TABLE IF NOT EXISTS` and the schema version
//! is tracked in `PRAGMA user_version`. A table missing from an older file is
//! tolerated by readers, never treated as corruption.

pub mod catalog;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;

pub use catalog::LocalCatalogStore;

/// Errors from the embedded stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file could not be opened or created.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A read or write did not complete.
    #[error("Transaction failed: {0}")]
    TransactionFailed(#[from] sqlx::Error),

    /// A stored row could not be decoded.
    #[error("Corrupt record {key}: {reason}")]
    Corrupt {
        /// Key of the offending row.
        key: String,
        /// What went wrong.
        reason: String,
    },
}

/// Where a database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// A file on disk, created on first use.
    File(PathBuf),
    /// A private in-memory database (tests and dry runs).
    Memory,
}

/// Open a connection pool for `location`.
///
/// File databases use WAL journaling so the proxy and the catalog store can
/// read while the other writes. In-memory databases are pinned to a single
/// connection that never idles out, since closing it discards the data.
///
/// # Errors
///
/// Returns `StoreError::StorageUnavailable` if the directory cannot be created
/// or the database cannot be opened.
pub async fn open_pool(location: &StoreLocation) -> Result<SqlitePool, StoreError> {
    match location {
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StoreError::StorageUnavailable(format!("{}: {e}", parent.display()))
                })?;
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));

            SqlitePoolOptions::new()
                .max_connections(4)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options)
                .await
                .map_err(|e| StoreError::StorageUnavailable(format!("{}: {e}", path.display())))
        }
        StoreLocation::Memory => {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .map_err(|e| StoreError::StorageUnavailable(format!("in-memory: {e}")))
        }
    }
}

/// Whether `err` is `SQLite` reporting a table that does not exist yet.
pub(crate) fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("no such table"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_pool() {
        let pool = open_pool(&StoreLocation::Memory).await.unwrap();
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(one, 1);
    }

    #[tokio::test]
    async fn test_open_file_pool_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/pricecheck.db");
        let pool = open_pool(&StoreLocation::File(path.clone())).await.unwrap();
        pool.close().await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_open_file_pool_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where a directory is expected
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let path = blocker.join("pricecheck.db");

        let err = open_pool(&StoreLocation::File(path)).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_table_detection() {
        let pool = open_pool(&StoreLocation::Memory).await.unwrap();
        let err = sqlx::query("SELECT value FROM nowhere")
            .fetch_optional(&pool)
            .await
            .map(|_| ())
            .unwrap_err();
        assert!(is_missing_table(&err));
    }
}
