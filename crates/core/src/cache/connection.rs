//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying pragmas for
//! concurrent access (WAL mode, busy timeout), and running the migrations
//! for the namespace table.

use super::migrations;
use crate::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_rusqlite::Connection;

/// Pragmas applied to every connection.
///
/// Concurrent writers from other connections wait on SQLite's own lock
/// for up to `busy_timeout` milliseconds.
const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA busy_timeout=5000;";

/// SQLite-backed cache store with time-to-live support.
///
/// Entries for a namespace `prefix` live in the table `<prefix>_cache`, so
/// several namespaces can share one file. Wraps a tokio-rusqlite Connection
/// that runs database operations on a background thread; clones share the
/// connection and the default TTL.
#[derive(Clone, Debug)]
pub struct SqliteCache {
    pub(crate) conn: Connection,
    pub(crate) table: Arc<str>,
    pub(crate) default_ttl: Arc<RwLock<Duration>>,
}

impl SqliteCache {
    /// Open a cache whose entries never expire by default.
    pub async fn open(path: impl AsRef<Path>, prefix: &str) -> Result<Self, Error> {
        Self::open_with_ttl(path, prefix, Duration::ZERO).await
    }

    /// Open a cache at the specified path with a default TTL for `save`.
    ///
    /// Creates the file if it doesn't exist, applies pragmas, and creates or
    /// upgrades the namespace table. Opening the same file again is safe.
    pub async fn open_with_ttl(path: impl AsRef<Path>, prefix: &str, default_ttl: Duration) -> Result<Self, Error> {
        let table = table_name(prefix)?;
        let conn = Connection::open(path).await.map_err(|e| Error::Storage(e.into()))?;
        Self::init(conn, table, default_ttl).await
    }

    /// Open an in-memory cache for testing.
    pub async fn open_in_memory(prefix: &str) -> Result<Self, Error> {
        let table = table_name(prefix)?;
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        Self::init(conn, table, Duration::ZERO).await
    }

    async fn init(conn: Connection, table: String, default_ttl: Duration) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Storage)?;

        migrations::run(&conn, &table).await?;

        tracing::debug!(table = %table, ?default_ttl, "opened sqlite cache");

        Ok(Self { conn, table: table.into(), default_ttl: Arc::new(RwLock::new(default_ttl)) })
    }

    /// Name of the table backing this cache.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Current default TTL used by `save`.
    pub async fn default_ttl(&self) -> Duration {
        *self.default_ttl.read().await
    }
}

/// Check that a namespace prefix is safe to splice into SQL identifiers.
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn table_name(prefix: &str) -> Result<String, Error> {
    if !is_valid_prefix(prefix) {
        return Err(Error::InvalidInput(format!(
            "cache prefix {prefix:?} must be non-empty and contain only ASCII letters, digits or '_'"
        )));
    }
    Ok(format!("{prefix}_cache"))
}
