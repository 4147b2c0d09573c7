//! Bounded retry with pure exponential backoff
//!
//! An operation is attempted up to `max_attempts` times. After a failed
//! attempt `n` (0-based) that is not the last one, the executor sleeps
//! `initial_delay * 2^n` before trying again; there is no jitter. The first
//! success short-circuits. If every attempt fails, the last error is handed
//! back unmodified inside [`RetryError::Exhausted`] together with the attempt
//! count.
//!
//! Nothing is shared between calls: each execution owns its attempt counter.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::clock::{Clock, SystemClock};

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed; `source` is the error of the final attempt
    #[error("All {attempts} retry attempts exhausted: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The retry configuration is invalid; the operation was never called
    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The next backoff would overrun `max_total_time`
    #[error("Retry deadline of {limit:?} exceeded after {attempts} attempts: {last_error}")]
    DeadlineExceeded {
        attempts: u32,
        limit: Duration,
        #[source]
        last_error: E,
    },

    /// The cancellation token fired before the operation succeeded
    #[error("Retry cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::DeadlineExceeded { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
            Self::InvalidConfiguration { .. } => 0,
        }
    }

    /// The operation's last error, if it ran at all
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } => Some(source),
            Self::DeadlineExceeded { last_error, .. } => Some(last_error),
            Self::InvalidConfiguration { .. } | Self::Cancelled { .. } => None,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Delay before the attempt following failed attempt `attempt`
///
/// `initial_delay * 2^attempt`, saturating instead of overflowing.
pub fn backoff_delay(initial_delay: Duration, attempt: u32) -> Duration {
    initial_delay.saturating_mul(2u32.saturating_pow(attempt))
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one
    pub initial_delay: Duration,
    /// Upper bound on the time spent retrying (None = unbounded)
    pub max_total_time: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay: Duration::from_millis(100), max_total_time: None }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate<E>(&self) -> RetryResult<(), E> {
        if self.max_attempts == 0 {
            return Err(RetryError::InvalidConfiguration {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    pub fn max_total_time(mut self, duration: Duration) -> Self {
        self.config.max_total_time = Some(duration);
        self
    }

    pub fn unlimited_time(mut self) -> Self {
        self.config.max_total_time = None;
        self
    }

    pub fn build(self) -> Result<RetryConfig, RetryError<Infallible>> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Executes operations under a [`RetryConfig`]
///
/// The blocking path sleeps through the executor's [`Clock`]; the async
/// paths suspend on `tokio::time::sleep`.
#[derive(Debug, Clone)]
pub struct RetryExecutor<C: Clock = SystemClock> {
    config: RetryConfig,
    clock: C,
}

impl RetryExecutor<SystemClock> {
    /// Create a new retry executor using the system clock
    pub fn new(config: RetryConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RetryExecutor<C> {
    /// Create a retry executor with a custom clock (useful for testing)
    pub fn with_clock(config: RetryConfig, clock: C) -> Self {
        Self { config, clock }
    }

    /// The configuration this executor applies
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` with retries, blocking the calling thread during
    /// backoff. The operation receives the 0-based attempt index.
    #[instrument(skip(self, operation), fields(max_attempts = self.config.max_attempts))]
    pub fn execute<F, T, E>(&self, mut operation: F) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: fmt::Debug,
    {
        self.config.validate()?;
        let started = self.clock.now();
        let mut attempt = 0;

        loop {
            let error = match operation(attempt) {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let delay = self.next_delay(attempt, self.clock.now().duration_since(started), error)?;
            self.clock.sleep(delay);
            attempt += 1;
        }
    }

    /// Async variant of [`RetryExecutor::execute`]
    pub async fn execute_async<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Debug,
    {
        self.execute_async_with_cancel(operation, &CancellationToken::new()).await
    }

    /// Async retry that stops as soon as `cancel` fires
    ///
    /// Cancellation interrupts both an in-flight attempt (its future is
    /// dropped) and a backoff sleep.
    #[instrument(skip(self, operation, cancel), fields(max_attempts = self.config.max_attempts))]
    pub async fn execute_async_with_cancel<F, Fut, T, E>(
        &self,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Debug,
    {
        self.config.validate()?;
        let started = tokio::time::Instant::now();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                debug!(attempt, "Retry cancelled before attempt");
                return Err(RetryError::Cancelled { attempts: attempt });
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = operation(attempt) => Some(result),
            };

            let error = match outcome {
                None => {
                    debug!(attempt, "Retry cancelled during attempt");
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                Some(Ok(value)) => {
                    if attempt > 0 {
                        debug!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Some(Err(error)) => error,
            };

            let delay = self.next_delay(attempt, started.elapsed(), error)?;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(attempt, "Retry cancelled during backoff");
                    return Err(RetryError::Cancelled { attempts: attempt + 1 });
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Backoff before the next attempt, or the terminal error if there is
    /// no next attempt.
    fn next_delay<E: fmt::Debug>(
        &self,
        attempt: u32,
        elapsed: Duration,
        error: E,
    ) -> RetryResult<Duration, E> {
        let attempts = attempt + 1;

        if attempts >= self.config.max_attempts {
            warn!(attempts, error = ?error, "All retry attempts exhausted");
            return Err(RetryError::Exhausted { attempts, source: error });
        }

        let delay = backoff_delay(self.config.initial_delay, attempt);
        if let Some(limit) = self.config.max_total_time {
            if elapsed.saturating_add(delay) > limit {
                warn!(attempts, ?limit, error = ?error, "Retry deadline would be exceeded");
                return Err(RetryError::DeadlineExceeded { attempts, limit, last_error: error });
            }
        }

        warn!(attempt = attempts, ?delay, error = ?error, "Operation failed, retrying");
        Ok(delay)
    }
}

/// Retry `operation` up to `max_attempts` times, sleeping
/// `initial_delay * 2^attempt` between failed attempts
///
/// `max_attempts == 0` is rejected with
/// [`RetryError::InvalidConfiguration`] without calling the operation.
pub fn retry<F, T, E>(operation: F, max_attempts: u32, initial_delay: Duration) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    E: fmt::Debug,
{
    let config = RetryConfig { max_attempts, initial_delay, max_total_time: None };
    RetryExecutor::new(config).execute(operation)
}

/// Async variant of [`retry`]
pub async fn retry_async<F, Fut, T, E>(
    operation: F,
    max_attempts: u32,
    initial_delay: Duration,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Debug,
{
    let config = RetryConfig { max_attempts, initial_delay, max_total_time: None };
    RetryExecutor::new(config).execute_async(operation).await
}
