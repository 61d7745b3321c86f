//! Cache record operations for [`SqliteCache`].
//!
//! Expiry is lazy: an expired row stays on disk and is only hidden from reads
//! until [`TtlCacheStore::clean_expired`] sweeps it.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio_rusqlite::params;

use super::connection::SqliteCache;
use super::hash::compute_cache_key;
use super::store::{CacheStore, Closer, ConfigurableCache, TtlCacheStore, TtlConfig};
use crate::Error;

/// Format used when writing `created_time` and `expires_at`.
///
/// Fixed width UTC, so text comparison in SQL orders chronologically and
/// matches the layout of SQLite's `CURRENT_TIMESTAMP`.
const STORED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Space separated layout accepted when reading, fraction optional.
const SPACED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(STORED_FORMAT).to_string()
}

/// Parse a stored expiry, accepting RFC 3339 and `YYYY-MM-DD HH:MM:SS`.
pub fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, Error> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, SPACED_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Decode(format!("failed to parse expires_at {raw:?}: {e}")))
}

/// Expiry for an entry written at `now`; `None` when `ttl` is zero.
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Result<Option<String>, Error> {
    if ttl.is_zero() {
        return Ok(None);
    }
    let delta = chrono::Duration::from_std(ttl).map_err(|e| Error::InvalidInput(format!("ttl {ttl:?}: {e}")))?;
    let at = now
        .checked_add_signed(delta)
        .ok_or_else(|| Error::InvalidInput(format!("ttl {ttl:?} overflows the clock")))?;
    Ok(Some(format_timestamp(at)))
}

impl SqliteCache {
    /// Number of stored rows, including expired rows not yet swept.
    pub async fn count(&self) -> Result<u64, Error> {
        let table = self.table.clone();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait::async_trait]
impl CacheStore for SqliteCache {
    /// Returns the value only while the entry is unexpired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let digest = compute_cache_key(key);
        let table = self.table.clone();
        let now = format_timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<Option<Vec<u8>>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT value FROM {table} WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)"
                ))?;

                let result = stmt.query_row(params![digest, now], |row| row.get::<_, Option<Vec<u8>>>(0));

                // Rows written by older tools may hold a NULL value; treat them as absent.
                match result {
                    Ok(value) => Ok(value),
                    Err(tokio_rusqlite::rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Saves with the current default TTL.
    async fn save(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        let ttl = self.default_ttl().await;
        self.save_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let digest = compute_cache_key(key);
        let table = self.table.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(&format!("DELETE FROM {table} WHERE key = ?1"), params![digest])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait::async_trait]
impl TtlCacheStore for SqliteCache {
    /// Replaces the entry in one transaction: delete, then insert.
    ///
    /// The expiry is computed from this store's clock at write time, so every
    /// overwrite starts a fresh TTL window.
    async fn save_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), Error> {
        let digest = compute_cache_key(key);
        let value = value.to_vec();
        let table = self.table.clone();
        let now = Utc::now();
        let created_time = format_timestamp(now);
        let expires_at = expiry_after(now, ttl)?;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(&format!("DELETE FROM {table} WHERE key = ?1"), params![digest])?;
                tx.execute(
                    &format!("INSERT INTO {table} (key, value, created_time, expires_at) VALUES (?1, ?2, ?3, ?4)"),
                    params![digest, value, created_time, expires_at],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn get_with_expiry(&self, key: &str) -> Result<Option<(Vec<u8>, Option<DateTime<Utc>>)>, Error> {
        let digest = compute_cache_key(key);
        let table = self.table.clone();
        let now = format_timestamp(Utc::now());

        let row = self
            .conn
            .call(move |conn| -> Result<Option<(Option<Vec<u8>>, Option<String>)>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT value, expires_at FROM {table}
                     WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)"
                ))?;

                let result = stmt.query_row(params![digest, now], |row| Ok((row.get(0)?, row.get(1)?)));

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(tokio_rusqlite::rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((Some(value), expires_at)) = row else {
            return Ok(None);
        };

        let expires_at = match expires_at.as_deref() {
            Some(raw) if !raw.is_empty() => Some(parse_expiry(raw)?),
            _ => None,
        };

        Ok(Some((value, expires_at)))
    }

    async fn clean_expired(&self) -> Result<u64, Error> {
        let table = self.table.clone();
        let now = format_timestamp(Utc::now());
        let removed = self
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    &format!("DELETE FROM {table} WHERE expires_at IS NOT NULL AND expires_at <= ?1"),
                    params![now],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(table = %self.table, removed, "swept expired cache entries");
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl ConfigurableCache for SqliteCache {
    async fn set_config(&self, config: TtlConfig) -> Result<(), Error> {
        *self.default_ttl.write().await = config.default_ttl;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Closer for SqliteCache {
    async fn close(&self) -> Result<(), Error> {
        self.conn.clone().close().await.map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use tokio_rusqlite::Connection;

    async fn sleep_secs(secs: u64) {
        tokio::time::sleep(tokio::time::Duration::from_secs(secs)).await;
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let db = SqliteCache::open_in_memory("test").await.unwrap();

        db.save("a", b"x").await.unwrap();

        assert_eq!(db.get("a").await.unwrap(), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn test_stored_under_digest() {
        let db = SqliteCache::open_in_memory("test").await.unwrap();
        db.save("https://example.com", b"body").await.unwrap();

        let digest = compute_cache_key("https://example.com");
        let stored: i64 = db
            .conn
            .call(move |conn| {
                conn.query_row("SELECT COUNT(*) FROM test_cache WHERE key = ?1", params![digest], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = SqliteCache::open_in_memory("test").await.unwrap();
        assert!(db.get("nonexistent").await.unwrap().is_none());
        assert!(db.get_with_expiry("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let db = SqliteCache::open_in_memory("test").await.unwrap();
        db.save("k", b"v").await.unwrap();

        db.delete("k").await.unwrap();
        db.delete("k").await.unwrap();

        assert!(db.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_resets_ttl() {
        let db = SqliteCache::open_in_memory("test").await.unwrap();

        db.save_with_ttl("k", b"old", Duration::from_secs(1)).await.unwrap();
        db.save("k", b"new").await.unwrap();

        let (value, expires_at) = db.get_with_expiry("k").await.unwrap().unwrap();
        assert_eq!(value, b"new");
        assert!(expires_at.is_none());
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lazy_expiration() {
        let db = SqliteCache::open_in_memory("test").await.unwrap();

        db.save_with_ttl("b", b"y", Duration::from_secs(1)).await.unwrap();
        assert_eq!(db.get("b").await.unwrap(), Some(b"y".to_vec()));

        sleep_secs(2).await;

        assert!(db.get("b").await.unwrap().is_none());
        assert!(db.get_with_expiry("b").await.unwrap().is_none());
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_with_expiry() {
        let db = SqliteCache::open_in_memory("test").await.unwrap();
        let before = Utc::now();

        db.save_with_ttl("k", b"v", Duration::from_secs(3600)).await.unwrap();

        let (value, expires_at) = db.get_with_expiry("k").await.unwrap().unwrap();
        let expires_at = expires_at.unwrap();
        assert_eq!(value, b"v");
        assert!(expires_at > before + chrono::Duration::seconds(3590));
        assert!(expires_at <= Utc::now() + chrono::Duration::seconds(3600));
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let db = SqliteCache::open_in_memory("test").await.unwrap();

        db.save_with_ttl("k", b"v", Duration::ZERO).await.unwrap();

        let (_, expires_at) = db.get_with_expiry("k").await.unwrap().unwrap();
        assert!(expires_at.is_none());
    }

    #[tokio::test]
    async fn test_clean_expired_is_selective() {
        let db = SqliteCache::open_in_memory("test").await.unwrap();
        db.save_with_ttl("expiring", b"1", Duration::from_secs(1)).await.unwrap();
        db.save_with_ttl("long", b"2", Duration::from_secs(3600)).await.unwrap();
        db.save("forever", b"3").await.unwrap();

        sleep_secs(2).await;

        assert_eq!(db.clean_expired().await.unwrap(), 1);
        assert_eq!(db.clean_expired().await.unwrap(), 0);
        assert_eq!(db.count().await.unwrap(), 2);
        assert!(db.get("long").await.unwrap().is_some());
        assert!(db.get("forever").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_config_changes_default_ttl() {
        let db = SqliteCache::open_in_memory("test").await.unwrap();

        db.set_config(TtlConfig { default_ttl: Duration::from_secs(1) }).await.unwrap();
        db.save("k", b"v").await.unwrap();

        let (_, expires_at) = db.get_with_expiry("k").await.unwrap().unwrap();
        assert!(expires_at.is_some());

        sleep_secs(2).await;
        assert!(db.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopen_is_safe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        let first = SqliteCache::open(&path, "pages").await.unwrap();
        first.save("a", b"x").await.unwrap();
        first.close().await.unwrap();

        let second = SqliteCache::open_with_ttl(&path, "pages", Duration::from_secs(60)).await.unwrap();
        assert_eq!(second.get("a").await.unwrap(), Some(b"x".to_vec()));
        second.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_legacy_rows_survive_migration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.sqlite");
        let digest = compute_cache_key("z");

        let legacy = Connection::open(&path).await.unwrap();
        legacy
            .call(move |conn| {
                conn.execute_batch(
                    "CREATE TABLE migration_cache (key TEXT PRIMARY KEY, value BLOB, created_time DATETIME)",
                )?;
                conn.execute(
                    "INSERT INTO migration_cache (key, value, created_time) VALUES (?1, ?2, datetime('now'))",
                    params![digest, b"v1".to_vec()],
                )?;
                Ok::<_, tokio_rusqlite::rusqlite::Error>(())
            })
            .await
            .unwrap();
        legacy.close().await.unwrap();

        let db = SqliteCache::open_with_ttl(&path, "migration", Duration::ZERO).await.unwrap();
        let (value, expires_at) = db.get_with_expiry("z").await.unwrap().unwrap();
        assert_eq!(value, b"v1");
        assert!(expires_at.is_none());

        db.save_with_ttl("fresh", b"v2", Duration::from_secs(60)).await.unwrap();
        assert_eq!(db.get("fresh").await.unwrap(), Some(b"v2".to_vec()));
        db.close().await.unwrap();

        let again = SqliteCache::open(&path, "migration").await.unwrap();
        assert_eq!(again.get("z").await.unwrap(), Some(b"v1".to_vec()));
        again.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.sqlite");

        let pages = SqliteCache::open(&path, "pages").await.unwrap();
        let api = SqliteCache::open(&path, "api").await.unwrap();
        pages.save("k", b"page").await.unwrap();

        assert!(api.get("k").await.unwrap().is_none());
        assert_eq!(pages.get("k").await.unwrap(), Some(b"page".to_vec()));
    }

    #[tokio::test]
    async fn test_unparsable_expiry_is_decode_error() {
        let db = SqliteCache::open_in_memory("test").await.unwrap();
        let digest = compute_cache_key("bad");
        db.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO test_cache (key, value, created_time, expires_at) VALUES (?1, ?2, NULL, ?3)",
                    params![digest, b"v".to_vec(), "yesterday-ish"],
                )
            })
            .await
            .unwrap();

        let result = db.get_with_expiry("bad").await;
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_parse_expiry_formats() {
        let rfc = parse_expiry("2030-01-02T03:04:05Z").unwrap();
        let spaced = parse_expiry("2030-01-02 03:04:05").unwrap();
        let fractional = parse_expiry("2030-01-02 03:04:05.250").unwrap();

        assert_eq!(rfc, spaced);
        assert_eq!((rfc.year(), rfc.month(), rfc.day(), rfc.hour()), (2030, 1, 2, 3));
        assert_eq!(fractional.timestamp_subsec_millis(), 250);
        assert!(matches!(parse_expiry("02/01/2030"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_stored_format_orders_with_current_timestamp() {
        let at = DateTime::parse_from_rfc3339("2030-01-02T03:04:05.5Z").unwrap().with_timezone(&Utc);
        let stored = format_timestamp(at);
        assert_eq!(stored, "2030-01-02 03:04:05.500");
        assert!(stored.as_str() > "2030-01-02 03:04:05");
        assert!(stored.as_str() < "2030-01-02 03:04:06");
    }
}
