//! Configuration for the answer cache

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the answer cache
///
/// The TTL is exact: an entry stored at `t` is served while `now - t < ttl`
/// and never after. There is no jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for cache entries
    pub ttl: Duration,

    /// Run a periodic purge task in addition to the per-request purge
    pub enable_auto_purge: bool,

    /// Interval for the periodic purge
    pub purge_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // 1 hour
            ttl: Duration::from_secs(3600),
            enable_auto_purge: false,
            // 5 minutes
            purge_interval: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl.is_zero() {
            return Err("ttl must be greater than 0".to_string());
        }

        if self.enable_auto_purge && self.purge_interval.is_zero() {
            return Err("purge_interval must be greater than 0 when auto purge is enabled".to_string());
        }

        Ok(())
    }

    /// TTL as a chrono duration, for comparisons against stored timestamps
    pub(crate) fn chrono_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::weeks(52 * 1000))
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    ttl: Option<Duration>,
    enable_auto_purge: Option<bool>,
    purge_interval: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Set the time-to-live for cache entries
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Enable or disable the periodic purge task
    pub fn enable_auto_purge(mut self, enable: bool) -> Self {
        self.enable_auto_purge = Some(enable);
        self
    }

    /// Set the periodic purge interval
    pub fn purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = Some(interval);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            ttl: self.ttl.unwrap_or(defaults.ttl),
            enable_auto_purge: self.enable_auto_purge.unwrap_or(defaults.enable_auto_purge),
            purge_interval: self.purge_interval.unwrap_or(defaults.purge_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert!(!config.enable_auto_purge);
    }

    #[test]
    fn test_config_validation() {
        assert!(CacheConfig::default().validate().is_ok());

        let invalid = CacheConfig::builder().ttl(Duration::ZERO).build();
        assert!(invalid.validate().is_err());

        let invalid = CacheConfig::builder()
            .enable_auto_purge(true)
            .purge_interval(Duration::ZERO)
            .build();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .ttl(Duration::from_secs(600))
            .enable_auto_purge(true)
            .purge_interval(Duration::from_secs(30))
            .build();

        assert_eq!(config.ttl, Duration::from_secs(600));
        assert!(config.enable_auto_purge);
        assert_eq!(config.purge_interval, Duration::from_secs(30));
    }
}
