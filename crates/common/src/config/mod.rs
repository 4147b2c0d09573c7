//! Settings for the resilience and cache components
//!
//! [`ResilienceSettings`] is the serde form of the component configs, so a
//! service can keep breaker, retry and cache tuning in one TOML or JSON file:
//!
//! ```toml
//! [circuit_breaker]
//! failure_threshold = 5
//! success_threshold = 2
//! reset_timeout_ms = 5000
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 100
//!
//! [cache]
//! ttl_ms = 300000
//! ```
//!
//! Every field is optional; missing fields take the component defaults.
//! See [`loader`] for file discovery and environment overrides.

pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfig, DEFAULT_SHARDS};
use crate::error::{CommonError, CommonResult};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};
use crate::utils::{duration_millis, option_duration_millis};

pub use loader::{load, load_from_env, load_from_file, discover_config_path};

/// Top-level settings document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceSettings {
    pub circuit_breaker: CircuitBreakerSettings,
    pub retry: RetrySettings,
    pub cache: CacheSettings,
}

impl ResilienceSettings {
    /// Check every section, reporting the first invalid one
    pub fn validate(&self) -> CommonResult<()> {
        self.circuit_breaker.to_config()?;
        self.retry.to_config()?;
        self.cache.to_config()?;
        Ok(())
    }
}

/// Circuit breaker tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u64,
    pub success_threshold: u64,
    #[serde(rename = "reset_timeout_ms", with = "duration_millis")]
    pub reset_timeout: Duration,
    pub reset_on_success: bool,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            success_threshold: defaults.success_threshold,
            reset_timeout: defaults.reset_timeout,
            reset_on_success: defaults.reset_on_success,
        }
    }
}

impl CircuitBreakerSettings {
    /// Build a validated breaker config (without a state-change listener)
    pub fn to_config(&self) -> CommonResult<CircuitBreakerConfig> {
        CircuitBreakerConfig::builder()
            .failure_threshold(self.failure_threshold)
            .success_threshold(self.success_threshold)
            .reset_timeout(self.reset_timeout)
            .reset_on_success(self.reset_on_success)
            .build()
            .map_err(|e| CommonError::config_field("circuit_breaker", e.to_string()))
    }
}

/// Retry tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    #[serde(rename = "initial_delay_ms", with = "duration_millis")]
    pub initial_delay: Duration,
    #[serde(
        rename = "max_total_time_ms",
        with = "option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_total_time: Option<Duration>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay: defaults.initial_delay,
            max_total_time: defaults.max_total_time,
        }
    }
}

impl RetrySettings {
    pub fn to_config(&self) -> CommonResult<RetryConfig> {
        let config = RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_total_time: self.max_total_time,
        };
        config
            .validate::<std::convert::Infallible>()
            .map_err(|e| CommonError::config_field("retry", e.to_string()))?;
        Ok(config)
    }
}

/// Cache tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(rename = "ttl_ms", with = "duration_millis")]
    pub ttl: Duration,
    #[serde(
        rename = "sweep_interval_ms",
        with = "option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub sweep_interval: Option<Duration>,
    pub shards: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self { ttl: defaults.ttl, sweep_interval: defaults.sweep_interval, shards: DEFAULT_SHARDS }
    }
}

impl CacheSettings {
    pub fn to_config(&self) -> CommonResult<CacheConfig> {
        let config =
            CacheConfig { ttl: self.ttl, sweep_interval: self.sweep_interval, shards: self.shards };
        config.validate().map_err(|e| CommonError::config_field("cache", e.to_string()))?;
        Ok(config)
    }
}
