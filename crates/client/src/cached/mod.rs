//! Cache-first fetching.
//!
//! [`CachingFetcher`] answers from its [`CacheStore`] when it can and falls
//! back to a [`RawFetcher`] otherwise, storing every successful body in a
//! [`CacheEnvelope`]. Failed fetches are never stored.
//!
//! The logical key of a request is `url + payload`, or its explicit keys
//! sorted and concatenated when it has any. A configured recombination hook
//! then has the final say before the store digests the key.
//!
//! Concurrent misses for the same key are not coalesced: each fetches and
//! the last write wins.

mod envelope;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

pub use envelope::{CacheEnvelope, EnvelopeRequest, decode_stored, encode_body};

use crate::fetch::{FetchConfig, FetchRequest, Fetcher, RawFetcher};
use fetchcache_core::{CacheStore, Error};

/// Rewrites a logical cache key before it is digested.
pub type KeyHook = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Transforms a freshly fetched body before it is cached and returned.
pub type BodyHandler = Arc<dyn Fn(Bytes) -> Bytes + Send + Sync>;

/// Configuration for the caching fetcher.
#[derive(Clone, Default)]
pub struct CachingConfig {
    pub fetch: FetchConfig,

    /// Key recombination hook (default: none)
    pub recombine_key: Option<KeyHook>,

    /// Body handlers, applied in order (default: none)
    pub body_handlers: Vec<BodyHandler>,
}

impl CachingConfig {
    pub fn new(fetch: FetchConfig) -> Self {
        Self { fetch, ..Default::default() }
    }

    pub fn with_recombine_key(mut self, hook: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.recombine_key = Some(Arc::new(hook));
        self
    }

    pub fn with_body_handler(mut self, handler: impl Fn(Bytes) -> Bytes + Send + Sync + 'static) -> Self {
        self.body_handlers.push(Arc::new(handler));
        self
    }
}

impl fmt::Debug for CachingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingConfig")
            .field("fetch", &self.fetch)
            .field("recombine_key", &self.recombine_key.is_some())
            .field("body_handlers", &self.body_handlers.len())
            .finish()
    }
}

/// Fetcher that serves repeated requests from a cache store.
#[derive(Clone)]
pub struct CachingFetcher {
    store: Arc<dyn CacheStore>,
    raw: RawFetcher,
    recombine_key: Option<KeyHook>,
    body_handlers: Vec<BodyHandler>,
}

impl CachingFetcher {
    pub fn new(store: Arc<dyn CacheStore>, config: CachingConfig) -> Result<Self, Error> {
        Ok(Self {
            store,
            raw: RawFetcher::new(config.fetch)?,
            recombine_key: config.recombine_key,
            body_handlers: config.body_handlers,
        })
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn raw(&self) -> &RawFetcher {
        &self.raw
    }

    /// Logical cache key for a request, before digesting.
    pub fn cache_key(&self, request: &FetchRequest) -> String {
        let key = if request.keys.is_empty() {
            format!("{}{}", request.url, request.payload)
        } else {
            let mut keys = request.keys.clone();
            keys.sort();
            keys.concat()
        };

        match &self.recombine_key {
            Some(hook) => hook(&key),
            None => key,
        }
    }

    /// Cached body for a request, without touching the network.
    pub async fn cached(&self, request: &FetchRequest) -> Result<Option<Bytes>, Error> {
        let key = self.cache_key(request);
        let stored = self.store.get(&key).await?;
        Ok(stored.map(decode_stored))
    }

    /// First cached body among several candidate requests.
    pub async fn try_cache(&self, requests: &[FetchRequest]) -> Result<Option<Bytes>, Error> {
        for request in requests {
            if let Some(body) = self.cached(request).await? {
                return Ok(Some(body));
            }
        }
        Ok(None)
    }

    /// Drop the cache slot of a request.
    pub async fn delete_cache(&self, request: &FetchRequest) -> Result<(), Error> {
        self.store.delete(&self.cache_key(request)).await
    }

    /// Fetch and deserialize a JSON body.
    ///
    /// A fresh body is stored only after it decodes as `T`; a body that does
    /// not decode fails the call and leaves the cache untouched.
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: FetchRequest) -> Result<T, Error> {
        let key = self.cache_key(&request);

        if let Some(body) = self.lookup(&key, &request).await? {
            return decode_json(&body);
        }

        let body = self.fetch_fresh(&request).await?;
        let value = decode_json(&body)?;
        self.store.save(&key, &encode_body(&request, &body)?).await?;

        Ok(value)
    }

    async fn lookup(&self, key: &str, request: &FetchRequest) -> Result<Option<Bytes>, Error> {
        let Some(stored) = self.store.get(key).await? else {
            tracing::debug!(method = %request.method, url = %request.url, "cache miss");
            return Ok(None);
        };
        tracing::debug!(method = %request.method, url = %request.url, "cache hit");
        Ok(Some(decode_stored(stored)))
    }

    /// Network fetch with the body handlers applied; nothing is stored.
    async fn fetch_fresh(&self, request: &FetchRequest) -> Result<Bytes, Error> {
        let mut body = self.raw.request(request).await?;
        for handler in &self.body_handlers {
            body = handler(body);
        }
        Ok(body)
    }
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(body).map_err(|e| Error::Decode(format!("failed to decode response body: {e}")))
}

#[async_trait::async_trait]
impl Fetcher for CachingFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Bytes, Error> {
        let key = self.cache_key(&request);

        if let Some(body) = self.lookup(&key, &request).await? {
            return Ok(body);
        }

        let body = self.fetch_fresh(&request).await?;
        self.store.save(&key, &encode_body(&request, &body)?).await?;

        Ok(body)
    }
}

impl fmt::Debug for CachingFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingFetcher")
            .field("raw", &self.raw)
            .field("recombine_key", &self.recombine_key.is_some())
            .field("body_handlers", &self.body_handlers.len())
            .finish_non_exhaustive()
    }
}
