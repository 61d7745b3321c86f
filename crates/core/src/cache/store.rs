//! Cache store contracts.
//!
//! The capabilities are split so a store only implements what it supports:
//! every store is a [`CacheStore`]; TTL-aware stores add [`TtlCacheStore`]
//! and [`ConfigurableCache`]; stores holding OS resources add [`Closer`].

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::Error;

/// Basic key/value cache.
///
/// Keys are logical keys; implementations digest them before touching storage.
/// A missing entry is `Ok(None)`, never an error.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the value stored for `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Store `value` under `key`, replacing whatever was there.
    async fn save(&self, key: &str, value: &[u8]) -> Result<(), Error>;

    /// Remove the entry for `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), Error>;
}

/// Cache with per-entry expiration.
#[async_trait::async_trait]
pub trait TtlCacheStore: CacheStore {
    /// Store `value` under `key`, expiring `ttl` after the write.
    ///
    /// A zero `ttl` stores an entry that never expires.
    async fn save_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), Error>;

    /// Read a live entry along with its expiry (`None` = never expires).
    async fn get_with_expiry(&self, key: &str) -> Result<Option<(Vec<u8>, Option<DateTime<Utc>>)>, Error>;

    /// Physically remove every expired entry, returning how many were removed.
    async fn clean_expired(&self) -> Result<u64, Error>;
}

/// Runtime TTL settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TtlConfig {
    /// TTL applied by [`CacheStore::save`]. Zero means never expire.
    pub default_ttl: Duration,
}

/// Cache whose defaults can be changed after construction.
#[async_trait::async_trait]
pub trait ConfigurableCache: CacheStore {
    async fn set_config(&self, config: TtlConfig) -> Result<(), Error>;
}

/// Store that holds resources which must be released explicitly.
#[async_trait::async_trait]
pub trait Closer {
    async fn close(&self) -> Result<(), Error>;
}
