//! Cache configuration

use crate::constants::*;
use crate::{ConfigError, DocacheError, DocacheResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a cache engine.
///
/// Fixed at construction; there is no live reload. A disabled cache turns
/// every engine operation into a direct pass-through to the backing store
/// and never starts the maintenance loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether caching is enabled at all.
    pub enabled: bool,
    /// Lifetime of a cache entry, measured from its last refresh.
    pub entry_ttl: Duration,
    /// Pause between two maintenance cycles (default: 1 second).
    pub flush_interval: Duration,
    /// Minimum time between two expiration sweeps (default: 30 seconds).
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entry_ttl: Duration::from_secs(DEFAULT_ENTRY_TTL_SECS),
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl CacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that bypasses the cache entirely.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Create CacheConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `DOCACHE_ENABLED`: Enable the cache (default: true)
    /// - `DOCACHE_ENTRY_TTL_SECS`: Entry time-to-live (default: 300)
    /// - `DOCACHE_FLUSH_INTERVAL_MS`: Maintenance cycle pause (default: 1000)
    /// - `DOCACHE_SWEEP_INTERVAL_SECS`: Minimum time between sweeps (default: 30)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unparsable values fall
    /// back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = lookup(ENV_ENABLED)
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        let entry_ttl = Duration::from_secs(
            lookup(ENV_ENTRY_TTL_SECS)
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_ENTRY_TTL_SECS),
        );

        let flush_interval = Duration::from_millis(
            lookup(ENV_FLUSH_INTERVAL_MS)
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_FLUSH_INTERVAL_MS),
        );

        let sweep_interval = Duration::from_secs(
            lookup(ENV_SWEEP_INTERVAL_SECS)
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        );

        Self {
            enabled,
            entry_ttl,
            flush_interval,
            sweep_interval,
        }
    }

    /// Enable or disable the cache.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Set the pause between maintenance cycles.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the minimum time between sweeps.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Validate the configuration.
    ///
    /// All durations must be positive and at most [`MAX_DURATION_SECS`].
    pub fn validate(&self) -> DocacheResult<()> {
        let durations = [
            ("entry_ttl", self.entry_ttl),
            ("flush_interval", self.flush_interval),
            ("sweep_interval", self.sweep_interval),
        ];

        for (field, value) in durations {
            if value.is_zero() {
                return Err(DocacheError::Config(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:?}", value),
                    reason: format!("{} must be positive", field),
                }));
            }
            if value > Duration::from_secs(MAX_DURATION_SECS) {
                return Err(DocacheError::Config(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:?}", value),
                    reason: format!("{} must not exceed {}s", field, MAX_DURATION_SECS),
                }));
            }
        }

        Ok(())
    }
}
