//! Resilience patterns for calls into unreliable dependencies
//!
//! This module provides:
//! - **Circuit Breaker**: stops calling a dependency after repeated failures
//!   and tries it again once a cool-down has elapsed
//! - **Retry Logic**: bounded retries with pure exponential backoff
//!
//! Both are generic over the wrapped operation's error type and never alter
//! that error; callers can always recover the original failure.
//!
//! Time flows through the [`Clock`] trait so tests can drive state changes
//! and backoff schedules with [`MockClock`] instead of sleeping.

pub mod circuit_breaker;
pub mod clock;
pub mod retry;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState, ConfigError, ConfigResult, ResilienceError, ResilienceResult,
    StateChangeListener,
};
pub use clock::{Clock, MockClock, SystemClock};
// Re-export retry types
pub use retry::{
    backoff_delay, retry, retry_async, RetryConfig, RetryConfigBuilder, RetryError,
    RetryExecutor, RetryResult,
};
