//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::time::Duration;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
/// Each cache instance owns its own configuration; there is no process-wide
/// singleton, so multiple independently configured caches can coexist.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum total payload bytes the cache may hold
    pub capacity_bytes: usize,
    /// Default TTL applied when a put omits one; `None` means entries
    /// without an explicit TTL never expire
    pub default_ttl: Option<Duration>,
    /// Background expiry sweep cadence
    pub sweep_interval: Duration,
    /// Maximum number of expired entries removed per sweep tick, bounding
    /// how long the sweep holds the write lock
    pub sweep_batch: usize,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY_BYTES` - Maximum total payload bytes (default: 64 MiB)
    /// - `CACHE_DEFAULT_TTL_SECS` - Default TTL in seconds, 0 = no default expiry (default: 300)
    /// - `CACHE_SWEEP_INTERVAL_SECS` - Sweep cadence in seconds (default: 30)
    /// - `CACHE_SWEEP_BATCH` - Max entries removed per sweep tick (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let default_ttl = match env::var("CACHE_DEFAULT_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.default_ttl,
        };

        Self {
            capacity_bytes: env::var("CACHE_CAPACITY_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.capacity_bytes),
            default_ttl,
            sweep_interval: env::var("CACHE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            sweep_batch: env::var("CACHE_SWEEP_BATCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sweep_batch),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 64 * 1024 * 1024,
            default_ttl: Some(Duration::from_secs(300)),
            sweep_interval: Duration::from_secs(30),
            sweep_batch: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity_bytes, 64 * 1024 * 1024);
        assert_eq!(config.default_ttl, Some(Duration::from_secs(300)));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.sweep_batch, 256);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_CAPACITY_BYTES");
        env::remove_var("CACHE_DEFAULT_TTL_SECS");
        env::remove_var("CACHE_SWEEP_INTERVAL_SECS");
        env::remove_var("CACHE_SWEEP_BATCH");

        let config = CacheConfig::from_env();
        assert_eq!(config.capacity_bytes, 64 * 1024 * 1024);
        assert_eq!(config.default_ttl, Some(Duration::from_secs(300)));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.sweep_batch, 256);
    }
}
