//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::cache::connection::is_valid_prefix;
use crate::config::{AppConfig, CacheBackend};
use thiserror::Error;

/// Longest accepted post-response pause (10 minutes).
const MAX_INTERVAL_MS: u64 = 600_000;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `namespace` is not a valid table prefix
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `interval_ms` exceeds 10 minutes
    /// - `user_agent` is empty
    /// - a proxy is not an http, https or socks5 URL
    ///
    /// Returns `ConfigError::Missing` if the selected backend has no path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_prefix(&self.namespace) {
            return Err(ConfigError::Invalid {
                field: "namespace".into(),
                reason: "must be non-empty ASCII letters, digits or '_'".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.interval_ms > MAX_INTERVAL_MS {
            return Err(ConfigError::Invalid {
                field: "interval_ms".into(),
                reason: "must not exceed 10 minutes (600000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        for proxy in &self.proxies {
            let parsed = url::Url::parse(proxy)
                .map_err(|e| ConfigError::Invalid { field: "proxies".into(), reason: format!("{proxy}: {e}") })?;
            if !matches!(parsed.scheme(), "http" | "https" | "socks5" | "socks5h") {
                return Err(ConfigError::Invalid {
                    field: "proxies".into(),
                    reason: format!("{proxy}: unsupported scheme {}", parsed.scheme()),
                });
            }
        }

        match self.backend {
            CacheBackend::Directory if self.cache_dir.as_os_str().is_empty() => {
                return Err(ConfigError::Missing {
                    field: "cache_dir".into(),
                    hint: "Set FETCHCACHE_CACHE_DIR environment variable".into(),
                });
            }
            CacheBackend::Sqlite if self.db_path.as_os_str().is_empty() => {
                return Err(ConfigError::Missing {
                    field: "db_path".into(),
                    hint: "Set FETCHCACHE_DB_PATH environment variable".into(),
                });
            }
            _ => {}
        }

        if self.backend == CacheBackend::Directory && self.default_ttl_secs > 0 {
            tracing::warn!(
                default_ttl_secs = self.default_ttl_secs,
                "default_ttl_secs is ignored by the directory backend; entries never expire"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_namespace() {
        let config = AppConfig { namespace: "my-cache".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "namespace"));
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { timeout_ms: 301_000, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_interval_exceeds_limit() {
        let config = AppConfig { interval_ms: MAX_INTERVAL_MS + 1, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "interval_ms"));
    }

    #[test]
    fn test_validate_zero_interval_allowed() {
        let config = AppConfig { interval_ms: 0, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "user_agent"));
    }

    #[test]
    fn test_validate_proxies() {
        let ok = AppConfig {
            proxies: vec!["http://10.0.0.1:3128".into(), "socks5://10.0.0.2:1080".into()],
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let bad = AppConfig { proxies: vec!["ftp://10.0.0.1".into()], ..Default::default() };
        assert!(matches!(bad.validate(), Err(ConfigError::Invalid { field, .. }) if field == "proxies"));

        let garbage = AppConfig { proxies: vec!["not a url".into()], ..Default::default() };
        assert!(matches!(garbage.validate(), Err(ConfigError::Invalid { field, .. }) if field == "proxies"));
    }

    #[test]
    fn test_validate_missing_paths() {
        let config = AppConfig { backend: CacheBackend::Directory, cache_dir: PathBuf::new(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Missing { field, .. }) if field == "cache_dir"));

        let config = AppConfig { db_path: PathBuf::new(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Missing { field, .. }) if field == "db_path"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig { timeout_ms: 100, interval_ms: MAX_INTERVAL_MS, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
