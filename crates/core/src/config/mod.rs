//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FETCHCACHE_*)
//! 2. TOML config file (if FETCHCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Which cache store backs the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// One file per entry under `cache_dir`.
    Directory,
    /// SQLite file at `db_path`, table `<namespace>_cache`.
    Sqlite,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FETCHCACHE_*)
/// 2. TOML config file (if FETCHCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache store variant.
    ///
    /// Set via FETCHCACHE_BACKEND (`directory` or `sqlite`).
    #[serde(default = "default_backend")]
    pub backend: CacheBackend,

    /// Root directory for the directory store.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Path to the SQLite cache database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Table namespace inside the SQLite file.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Default TTL for SQLite entries in seconds; 0 keeps entries forever.
    #[serde(default)]
    pub default_ttl_secs: u64,

    /// Pause after each response, in milliseconds, before the fetch returns.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Whether response bodies are raw-deflate compressed.
    #[serde(default)]
    pub deflate: bool,

    /// Proxy URLs handed out round-robin, one per request.
    #[serde(default)]
    pub proxies: Vec<String>,
}

fn default_backend() -> CacheBackend {
    CacheBackend::Sqlite
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./fetchcache")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./fetchcache.sqlite")
}

fn default_namespace() -> String {
    "fetch".into()
}

fn default_interval_ms() -> u64 {
    1_000
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_user_agent() -> String {
    "fetchcache/0.1".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            cache_dir: default_cache_dir(),
            db_path: default_db_path(),
            namespace: default_namespace(),
            default_ttl_secs: 0,
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
            deflate: false,
            proxies: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Post-response pause as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Default TTL for the SQLite store.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `FETCHCACHE_`
    /// 2. TOML file from `FETCHCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var_os("FETCHCACHE_CONFIG_FILE").map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    /// Same as [`AppConfig::load`], with the TOML layer read from `file`.
    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(
            Env::prefixed("FETCHCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
