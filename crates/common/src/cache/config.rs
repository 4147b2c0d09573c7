//! Cache configuration types and builder patterns

use std::time::Duration;

use super::error::{CacheError, CacheResult};

/// Default number of store shards
pub const DEFAULT_SHARDS: usize = 64;

/// Lower bound for the sweep interval
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Largest accepted time-to-live
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Configuration for cache behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Time-to-live applied to every entry
    pub ttl: Duration,

    /// How often expired entries are swept (None = `ttl / 10`)
    pub sweep_interval: Option<Duration>,

    /// Number of store shards; must be a power of two greater than 1
    pub shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(300), sweep_interval: None, shards: DEFAULT_SHARDS }
    }
}

impl CacheConfig {
    /// Create a new configuration builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Quick preset: given ttl, everything else default
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use bulwark_common::cache::CacheConfig;
    ///
    /// let config = CacheConfig::with_ttl(Duration::from_secs(60));
    /// assert_eq!(config.effective_sweep_interval(), Duration::from_secs(6));
    /// ```
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl, ..Self::default() }
    }

    /// Sweep interval actually used by the background sweeper
    pub fn effective_sweep_interval(&self) -> Duration {
        self.sweep_interval.unwrap_or(self.ttl / 10).max(MIN_SWEEP_INTERVAL)
    }

    /// Validate the configuration
    pub fn validate(&self) -> CacheResult<()> {
        if self.ttl.is_zero() {
            return Err(CacheError::InvalidConfiguration {
                message: "ttl must be greater than 0".to_string(),
            });
        }

        if self.ttl > MAX_TTL {
            return Err(CacheError::InvalidConfiguration {
                message: format!("ttl must not exceed {MAX_TTL:?}"),
            });
        }

        if self.shards < 2 || !self.shards.is_power_of_two() {
            return Err(CacheError::InvalidConfiguration {
                message: format!("shards must be a power of two greater than 1, got {}", self.shards),
            });
        }

        Ok(())
    }
}

/// Builder for CacheConfig with fluent API
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set time-to-live for entries
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.config.ttl = duration;
        self
    }

    /// Override the derived sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = Some(interval);
        self
    }

    pub fn shards(mut self, shards: usize) -> Self {
        self.config.shards = shards;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> CacheResult<CacheConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
