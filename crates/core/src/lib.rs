//! Core types and shared functionality for fetchcache.
//!
//! This crate provides:
//! - Cache store contracts and the directory/SQLite implementations
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheStore, Closer, ConfigurableCache, DirectoryStore, SqliteCache, TtlCacheStore, TtlConfig};
pub use config::{AppConfig, CacheBackend, ConfigError};
pub use error::Error;
