//! Client code for fetchcache.
//!
//! This crate provides the throttled, proxy-aware HTTP fetcher and the
//! cache-first fetcher layered on top of the core cache stores.

pub mod cached;
pub mod fetch;

pub use cached::{CacheEnvelope, CachingConfig, CachingFetcher};
pub use fetch::{FetchConfig, FetchRequest, Fetcher, ProxyPool, RawFetcher, RoundRobinProxyPool};
