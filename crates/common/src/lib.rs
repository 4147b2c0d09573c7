//! In-process resilience and caching primitives.
//!
//! - [`resilience::CircuitBreaker`]: fail fast while a dependency is
//!   unhealthy, try it again after a cool-down
//! - [`resilience::retry`] / [`resilience::RetryExecutor`]: bounded retries
//!   with exponential backoff
//! - [`cache::TtlCache`]: TTL key/value cache whose `get_or_set` coalesces
//!   concurrent loads of the same key
//!
//! The three are independent and meant to be composed by the caller, for
//! example a cache loader that goes through a breaker which in turn retries.
//!
//! # Feature Tiers
//!
//! - `foundation`: errors and serde helpers
//! - `observability`: `tracing` instrumentation
//! - `runtime` (default): the components, settings and test helpers
//! - `test-utils`: adds `testing::init_test_tracing`

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod cache;
#[cfg(feature = "runtime")]
pub mod config;
#[cfg(feature = "runtime")]
pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use cache::{CacheConfig, CacheError, CacheStats, LoadError, TtlCache};
#[cfg(feature = "runtime")]
pub use config::ResilienceSettings;
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{
    retry, retry_async, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitBreakerMetrics, CircuitState, Clock, MockClock, ResilienceError, ResilienceResult,
    RetryConfig, RetryConfigBuilder, RetryError, RetryExecutor, RetryResult, SystemClock,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
