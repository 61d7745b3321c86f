//! Persistent key/value caches.
//!
//! Two stores implement the same contract:
//!
//! - [`DirectoryStore`]: one file per entry inside a root directory
//! - [`SqliteCache`]: one table per namespace in an SQLite file, with
//!   time-to-live columns, lazy expiration and schema migrations
//!
//! Both name entries by the SHA-256 digest of the logical key, never by
//! the key itself.

pub mod connection;
pub mod directory;
pub mod hash;
pub mod migrations;
pub mod records;
pub mod store;

pub use crate::Error;

pub use connection::SqliteCache;
pub use directory::DirectoryStore;
pub use store::{CacheStore, Closer, ConfigurableCache, TtlCacheStore, TtlConfig};
