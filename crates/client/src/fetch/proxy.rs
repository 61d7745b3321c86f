//! Proxy selection for outgoing requests.
//!
//! A [`ProxyPool`] is asked for an endpoint on every request; the fetcher
//! routes only that request through it, so consecutive requests may leave
//! through different proxies.

use std::sync::atomic::{AtomicUsize, Ordering};

use fetchcache_core::Error;
use reqwest::Proxy;
use url::Url;

/// Supplier of proxy endpoints.
pub trait ProxyPool: Send + Sync {
    /// Next HTTP(S) proxy, if the pool has one.
    fn http_proxy(&self) -> Option<Url>;

    /// Next SOCKS5 proxy, if the pool has one.
    fn socks5_proxy(&self) -> Option<Url>;
}

/// Pick the proxy for one request: HTTP first, then SOCKS5.
pub fn select(pool: &dyn ProxyPool) -> Option<Url> {
    pool.http_proxy().or_else(|| pool.socks5_proxy())
}

/// Build a reqwest proxy that routes every scheme through `url`.
pub fn build_proxy(url: &Url) -> Result<Proxy, Error> {
    Proxy::all(url.as_str()).map_err(|e| Error::InvalidInput(format!("invalid proxy URL {url}: {e}")))
}

/// Pool cycling through a fixed list of proxies.
///
/// URLs with a `socks5`/`socks5h` scheme are served by
/// [`ProxyPool::socks5_proxy`], everything else by [`ProxyPool::http_proxy`].
#[derive(Debug, Default)]
pub struct RoundRobinProxyPool {
    http: Vec<Url>,
    socks5: Vec<Url>,
    next_http: AtomicUsize,
    next_socks5: AtomicUsize,
}

impl RoundRobinProxyPool {
    /// Create a pool from already parsed URLs.
    pub fn new(proxies: impl IntoIterator<Item = Url>) -> Self {
        let (socks5, http): (Vec<Url>, Vec<Url>) = proxies
            .into_iter()
            .partition(|url| matches!(url.scheme(), "socks5" | "socks5h"));
        Self { http, socks5, next_http: AtomicUsize::new(0), next_socks5: AtomicUsize::new(0) }
    }

    /// Parse and pool a list of proxy URL strings.
    pub fn parse<S: AsRef<str>>(proxies: &[S]) -> Result<Self, Error> {
        let urls = proxies
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                Url::parse(raw).map_err(|e| Error::InvalidInput(format!("invalid proxy URL {raw}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(urls))
    }

    pub fn is_empty(&self) -> bool {
        self.http.is_empty() && self.socks5.is_empty()
    }

    pub fn len(&self) -> usize {
        self.http.len() + self.socks5.len()
    }
}

fn next(list: &[Url], cursor: &AtomicUsize) -> Option<Url> {
    if list.is_empty() {
        return None;
    }
    let index = cursor.fetch_add(1, Ordering::Relaxed) % list.len();
    Some(list[index].clone())
}

impl ProxyPool for RoundRobinProxyPool {
    fn http_proxy(&self) -> Option<Url> {
        next(&self.http, &self.next_http)
    }

    fn socks5_proxy(&self) -> Option<Url> {
        next(&self.socks5, &self.next_socks5)
    }
}
