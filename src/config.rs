//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::upstream::{DEFAULT_GEOCODING_URL, DEFAULT_WEATHER_URL};

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Freshness lifetime of a cached weather entry, in seconds
    pub ttl_seconds: u64,
    /// Bound on a single upstream attempt, in milliseconds
    pub fetch_timeout_ms: u64,
    /// Retries after an upstream timeout
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds
    pub retry_backoff_ms: u64,
    /// Upstream fetches allowed per (location, caller) per window
    pub rate_limit_per_key: usize,
    /// Rate limit window, in milliseconds
    pub rate_limit_window_ms: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background maintenance interval in seconds
    pub cleanup_interval: u64,
    /// How long an expired entry stays usable as a stale fallback, in seconds
    pub stale_retention_secs: u64,
    /// Directory of the durable store; in-memory when unset
    pub cache_dir: Option<PathBuf>,
    /// Open-Meteo forecast API base URL
    pub weather_api_url: String,
    /// Open-Meteo geocoding API base URL
    pub geocoding_api_url: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `TTL_SECONDS` - Entry freshness lifetime (default: 300)
    /// - `FETCH_TIMEOUT_MS` - Per-attempt upstream bound (default: 10000)
    /// - `MAX_RETRIES` - Retries on upstream timeout (default: 2)
    /// - `RETRY_BACKOFF_MS` - First retry delay (default: 100)
    /// - `RATE_LIMIT_PER_KEY` - Fetches per window (default: 10)
    /// - `RATE_LIMIT_WINDOW_MS` - Rate limit window (default: 60000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Maintenance frequency in seconds (default: 60)
    /// - `STALE_RETENTION_SECS` - Stale fallback retention (default: 86400)
    /// - `CACHE_DIR` - Durable store directory (default: in-memory)
    /// - `WEATHER_API_URL` / `GEOCODING_API_URL` - Upstream base URLs
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ttl_seconds: env_or("TTL_SECONDS", defaults.ttl_seconds),
            fetch_timeout_ms: env_or("FETCH_TIMEOUT_MS", defaults.fetch_timeout_ms),
            max_retries: env_or("MAX_RETRIES", defaults.max_retries),
            retry_backoff_ms: env_or("RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            rate_limit_per_key: env_or("RATE_LIMIT_PER_KEY", defaults.rate_limit_per_key),
            rate_limit_window_ms: env_or("RATE_LIMIT_WINDOW_MS", defaults.rate_limit_window_ms),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            stale_retention_secs: env_or("STALE_RETENTION_SECS", defaults.stale_retention_secs),
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            weather_api_url: env::var("WEATHER_API_URL").unwrap_or(defaults.weather_api_url),
            geocoding_api_url: env::var("GEOCODING_API_URL")
                .unwrap_or(defaults.geocoding_api_url),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            fetch_timeout_ms: 10_000,
            max_retries: 2,
            retry_backoff_ms: 100,
            rate_limit_per_key: 10,
            rate_limit_window_ms: 60_000,
            server_port: 3000,
            cleanup_interval: 60,
            stale_retention_secs: 86_400,
            cache_dir: None,
            weather_api_url: DEFAULT_WEATHER_URL.to_string(),
            geocoding_api_url: DEFAULT_GEOCODING_URL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.ttl_seconds, 300);
        assert_eq!(config.fetch_timeout_ms, 10_000);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.rate_limit_per_key, 10);
        assert_eq!(config.rate_limit_window_ms, 60_000);
        assert_eq!(config.server_port, 3000);
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("TTL_SECONDS");
        env::remove_var("FETCH_TIMEOUT_MS");
        env::remove_var("MAX_RETRIES");
        env::remove_var("RATE_LIMIT_PER_KEY");
        env::remove_var("SERVER_PORT");
        env::remove_var("CACHE_DIR");

        let config = Config::from_env();
        assert_eq!(config.ttl_seconds, 300);
        assert_eq!(config.fetch_timeout_ms, 10_000);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.rate_limit_per_key, 10);
        assert_eq!(config.server_port, 3000);
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_env_or_ignores_unparsable_values() {
        env::set_var("WEATHER_CACHE_TEST_BAD_NUMBER", "not-a-number");
        assert_eq!(env_or("WEATHER_CACHE_TEST_BAD_NUMBER", 42u64), 42);
        env::remove_var("WEATHER_CACHE_TEST_BAD_NUMBER");
    }
}
