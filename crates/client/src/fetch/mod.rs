//! Throttled, proxy-aware HTTP fetch.
//!
//! ### Request
//! - Method, body only when the payload is non-empty
//! - Default headers merged with per-call headers; per-call names win
//! - Proxy: per-request override, else one endpoint from the pool, used for
//!   this request only
//!
//! ### Response
//! - Transport failures are returned as-is; nothing is retried
//! - A fixed pause follows every response, before the body is returned
//! - Optional raw-deflate decoding of the body
//! - Status outside 2xx becomes `Error::Status` with the decoded body

pub mod proxy;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

pub use proxy::{ProxyPool, RoundRobinProxyPool};
pub use reqwest::Method;

use fetchcache_core::{AppConfig, Error};

/// One outgoing request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    /// Request body; empty means no body is sent.
    pub payload: String,
    /// Per-call headers, overriding defaults with the same name.
    pub headers: HeaderMap,
    /// Proxy for this request only, bypassing the pool.
    pub proxy: Option<Url>,
    /// Explicit cache keys; when set they replace `url + payload` as the
    /// logical cache key so equivalent requests can share an entry.
    pub keys: Vec<String>,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            payload: String::new(),
            headers: HeaderMap::new(),
            proxy: None,
            keys: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(Method::POST, url).with_payload(payload)
    }

    pub fn put(url: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(Method::PUT, url).with_payload(payload)
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_proxy(mut self, proxy: Url) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// Configuration for the raw fetcher.
#[derive(Clone)]
pub struct FetchConfig {
    /// Headers sent with every request (default: none)
    pub headers: HeaderMap,

    /// Pause after each response before returning (default: none)
    pub interval: Duration,

    /// Source of per-request proxies (default: none)
    pub proxy_pool: Option<Arc<dyn ProxyPool>>,

    /// Whether bodies are raw-deflate compressed (default: false)
    pub deflate: bool,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// User agent string (default: "fetchcache/0.1")
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            interval: Duration::ZERO,
            proxy_pool: None,
            deflate: false,
            timeout: Duration::from_millis(20000),
            user_agent: "fetchcache/0.1".to_string(),
        }
    }
}

impl fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("headers", &self.headers)
            .field("interval", &self.interval)
            .field("proxy_pool", &self.proxy_pool.is_some())
            .field("deflate", &self.deflate)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl TryFrom<&AppConfig> for FetchConfig {
    type Error = Error;

    fn try_from(config: &AppConfig) -> Result<Self, Error> {
        let proxy_pool: Option<Arc<dyn ProxyPool>> = if config.proxies.is_empty() {
            None
        } else {
            Some(Arc::new(RoundRobinProxyPool::parse(&config.proxies)?))
        };

        Ok(Self {
            headers: header_map(&config.headers)?,
            interval: config.interval(),
            proxy_pool,
            deflate: config.deflate,
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
        })
    }
}

/// Convert a name→value map into a header map.
pub fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, Error> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidInput(format!("invalid value for header {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Merge per-call headers over the defaults.
///
/// Every name present in `overrides` replaces all default values for that name.
pub fn merge_headers(defaults: &HeaderMap, overrides: &HeaderMap) -> HeaderMap {
    let mut merged = defaults.clone();
    for name in overrides.keys() {
        merged.remove(name);
    }
    for (name, value) in overrides {
        merged.append(name.clone(), value.clone());
    }
    merged
}

fn inflate(raw: &[u8]) -> Result<Bytes, Error> {
    let mut body = Vec::with_capacity(raw.len() * 2);
    flate2::read::DeflateDecoder::new(raw)
        .read_to_end(&mut body)
        .map_err(|e| Error::Decode(format!("failed to inflate response body: {e}")))?;
    Ok(Bytes::from(body))
}

/// Common HTTP verbs over [`Fetcher::fetch`].
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Execute one request and return its body.
    async fn fetch(&self, request: FetchRequest) -> Result<Bytes, Error>;

    async fn get(&self, url: &str) -> Result<Bytes, Error> {
        self.fetch(FetchRequest::get(url)).await
    }

    async fn post(&self, url: &str, payload: &str) -> Result<Bytes, Error> {
        self.fetch(FetchRequest::post(url, payload)).await
    }

    async fn put(&self, url: &str, payload: &str) -> Result<Bytes, Error> {
        self.fetch(FetchRequest::put(url, payload)).await
    }

    async fn get_with_header(&self, url: &str, headers: HeaderMap) -> Result<Bytes, Error> {
        self.fetch(FetchRequest::get(url).with_headers(headers)).await
    }

    async fn post_with_header(&self, url: &str, payload: &str, headers: HeaderMap) -> Result<Bytes, Error> {
        self.fetch(FetchRequest::post(url, payload).with_headers(headers)).await
    }

    async fn put_with_header(&self, url: &str, payload: &str, headers: HeaderMap) -> Result<Bytes, Error> {
        self.fetch(FetchRequest::put(url, payload).with_headers(headers)).await
    }
}

/// HTTP fetcher without caching.
#[derive(Debug, Clone)]
pub struct RawFetcher {
    http: Client,
    config: FetchConfig,
}

impl RawFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Self::client_builder(&config)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn client_builder(config: &FetchConfig) -> ClientBuilder {
        // Raw-deflate bodies are inflated by hand; reqwest must not decode them first.
        Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(!config.deflate)
    }

    /// Client for one request: the shared one, or a dedicated one bound to `proxy`.
    fn client_for(&self, proxy: Option<&Url>) -> Result<Client, Error> {
        let Some(proxy) = proxy else {
            return Ok(self.http.clone());
        };
        Self::client_builder(&self.config)
            .proxy(proxy::build_proxy(proxy)?)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client for proxy {proxy}: {e}")))
    }

    /// Execute one request.
    ///
    /// The configured interval is slept after the response arrives and before
    /// the body is read, so it delays the caller rather than pacing requests:
    /// concurrent callers are not serialized by it.
    pub async fn request(&self, request: &FetchRequest) -> Result<Bytes, Error> {
        let start = Instant::now();
        let url = Url::parse(&request.url).map_err(|e| Error::InvalidInput(format!("invalid URL {}: {e}", request.url)))?;

        let proxy = request
            .proxy
            .clone()
            .or_else(|| self.config.proxy_pool.as_deref().and_then(proxy::select));
        let client = self.client_for(proxy.as_ref())?;

        let mut builder = client
            .request(request.method.clone(), url)
            .headers(merge_headers(&self.config.headers, &request.headers));
        if !request.payload.is_empty() {
            builder = builder.body(request.payload.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Transport(format!("network error: {e}")))?;

        let status = response.status();

        if !self.config.interval.is_zero() {
            tokio::time::sleep(self.config.interval).await;
        }

        let raw = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("failed to read response: {e}")))?;
        let body = if self.config.deflate { inflate(&raw)? } else { raw };

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            proxied = proxy.is_some(),
            bytes = body.len(),
            "fetched in {}ms",
            start.elapsed().as_millis()
        );

        if !status.is_success() {
            return Err(Error::Status {
                code: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(body)
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl Fetcher for RawFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Bytes, Error> {
        self.request(&request).await
    }
}
