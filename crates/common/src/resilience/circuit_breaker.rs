//! Circuit breaker guarding calls to an unreliable dependency
//!
//! Once the wrapped operation fails `failure_threshold` times the breaker
//! opens and rejects calls with [`ResilienceError::CircuitOpen`] without
//! running them. After `reset_timeout` the next call is let through as a
//! trial (half-open); `success_threshold` trial successes close the breaker
//! again and a single trial failure reopens it.
//!
//! Every call, including the wrapped operation, runs under one gate per
//! breaker, so at most one call is in flight through a breaker at a time.
//! Sync ([`CircuitBreaker::call`]) and async ([`CircuitBreaker::execute`])
//! callers share that gate.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{Mutex as CallGate, MutexGuard as GateGuard};
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};

/// How often a sync caller on a current-thread runtime re-checks the gate
const GATE_POLL_INTERVAL: Duration = Duration::from_millis(1);

//==============================================================================
// Error Types
//==============================================================================

/// Simple configuration error for validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors returned by a call through a circuit breaker
///
/// The operation's own error is carried unmodified in `OperationFailed`, so
/// callers can tell a rejected call apart from a genuine failure.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open, rejecting calls
    ///
    /// `retry_after` is the time left until the breaker admits a trial call.
    #[error("Circuit breaker is open, rejecting calls (retry in {retry_after:?})")]
    CircuitOpen { retry_after: Duration },

    /// The underlying operation failed
    #[error("Operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Whether the call was rejected without running the operation
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Remaining cool-down when the call was rejected
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after } => Some(*retry_after),
            Self::OperationFailed { .. } => None,
        }
    }

    /// The operation's error, if the operation ran and failed
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::CircuitOpen { .. } => None,
            Self::OperationFailed { source } => Some(source),
        }
    }
}

/// Result type for calls through a circuit breaker
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

//==============================================================================
// Configuration
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is half-open, letting trial requests test recovery
    HalfOpen,
    /// Circuit is open, rejecting requests
    Open,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
            CircuitState::Open => write!(f, "OPEN"),
        }
    }
}

/// Observer invoked with `(previous, new)` on every state change
///
/// Listeners run off the calling thread and never delay the call that
/// caused the transition.
pub type StateChangeListener = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

/// Configuration for circuit breaker behavior
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u64,
    /// Number of trial successes needed to close the circuit from half-open
    pub success_threshold: u64,
    /// Time to stay open after the last failure before allowing a trial call
    pub reset_timeout: Duration,
    /// Whether a success in closed state clears the failure count
    pub reset_on_success: bool,
    /// Optional state change observer
    pub on_state_change: Option<StateChangeListener>,
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("reset_on_success", &self.reset_on_success)
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(5),
            reset_on_success: false,
            on_state_change: None,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.success_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "success_threshold must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u64) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u64) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn reset_on_success(mut self, reset: bool) -> Self {
        self.config.reset_on_success = reset;
        self
    }

    pub fn on_state_change<F>(mut self, listener: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.config.on_state_change = Some(Arc::new(listener));
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub last_failure_time: Option<Instant>,
    pub state_change_time: Instant,
}

//==============================================================================
// Circuit Breaker
//==============================================================================

#[derive(Debug)]
struct BreakerState {
    current: CircuitState,
    failure_count: u64,
    success_count: u64,
    last_failure_at: Option<Instant>,
    changed_at: Instant,
}

/// Generic circuit breaker
///
/// Cloning yields another handle to the same breaker.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    gate: Arc<CallGate<()>>,
    state: Arc<Mutex<BreakerState>>,
    total_calls: Arc<AtomicU64>,
    rejected_calls: Arc<AtomicU64>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &state.current)
            .field("failure_count", &state.failure_count)
            .field("success_count", &state.success_count)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            gate: Arc::clone(&self.gate),
            state: Arc::clone(&self.state),
            total_calls: Arc::clone(&self.total_calls),
            rejected_calls: Arc::clone(&self.rejected_calls),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker with the given configuration using system
    /// clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a circuit breaker with default configuration
    /// (5 failures, 2 trial successes, 5s reset timeout)
    pub fn with_defaults() -> Self {
        Self::build_unchecked(CircuitBreakerConfig::default(), SystemClock)
    }

    /// Create a circuit breaker using the builder pattern
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::build_unchecked(config, clock))
    }

    fn build_unchecked(config: CircuitBreakerConfig, clock: C) -> Self {
        let now = clock.now();
        Self {
            config,
            gate: Arc::new(CallGate::new(())),
            state: Arc::new(Mutex::new(BreakerState {
                current: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
                changed_at: now,
            })),
            total_calls: Arc::new(AtomicU64::new(0)),
            rejected_calls: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(clock),
        }
    }

    /// Execute a synchronous operation with circuit breaker protection
    ///
    /// Blocks while another call holds the breaker, then for the duration of
    /// `operation`. Safe to call from a thread that is driving a tokio
    /// runtime; prefer [`CircuitBreaker::execute`] in async code so the
    /// worker thread is not tied up.
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub fn call<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let _gate = self.lock_gate_blocking();

        if let Err(retry_after) = self.try_acquire() {
            debug!(?retry_after, "Circuit breaker rejecting call");
            return Err(ResilienceError::CircuitOpen { retry_after });
        }

        let result = operation();
        self.complete(result)
    }

    /// Execute an async operation with circuit breaker protection
    ///
    /// The breaker gate is held across the operation's `.await`. Dropping the
    /// returned future before the operation finishes records neither a
    /// success nor a failure.
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let _gate = self.gate.lock().await;

        if let Err(retry_after) = self.try_acquire() {
            debug!(?retry_after, "Circuit breaker rejecting call");
            return Err(ResilienceError::CircuitOpen { retry_after });
        }

        let result = operation().await;
        self.complete(result)
    }

    /// Take the call gate from synchronous code
    ///
    /// `blocking_lock` panics on a runtime thread, so inside a multi-thread
    /// runtime the wait moves out of the worker with `block_in_place`. A
    /// current-thread runtime cannot give up its only thread; there the gate
    /// is polled.
    fn lock_gate_blocking(&self) -> GateGuard<'_, ()> {
        if let Ok(guard) = self.gate.try_lock() {
            return guard;
        }

        match Handle::try_current() {
            Err(_) => self.gate.blocking_lock(),
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.gate.lock()))
            }
            Ok(_) => loop {
                thread::sleep(GATE_POLL_INTERVAL);
                if let Ok(guard) = self.gate.try_lock() {
                    return guard;
                }
            },
        }
    }

    /// Decide whether a call may run, moving Open to HalfOpen once the reset
    /// timeout has elapsed since the last failure. A rejection carries the
    /// remaining cool-down.
    fn try_acquire(&self) -> Result<(), Duration> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();

        match state.current {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let now = self.clock.now();
                let elapsed = state
                    .last_failure_at
                    .map_or(self.config.reset_timeout, |at| now.saturating_duration_since(at));

                if elapsed >= self.config.reset_timeout {
                    state.success_count = 0;
                    self.transition(&mut state, CircuitState::HalfOpen);
                    Ok(())
                } else {
                    self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                    Err(self.config.reset_timeout - elapsed)
                }
            }
        }
    }

    fn complete<T, E>(&self, result: Result<T, E>) -> ResilienceResult<T, E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match result {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                warn!(error = %error, "Circuit breaker: operation failed");
                self.on_failure();
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.state.lock();

        match state.current {
            CircuitState::Closed => {
                if self.config.reset_on_success {
                    state.failure_count = 0;
                }
            }
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    info!(successes = state.success_count, "Circuit breaker closing after trial successes");
                    state.failure_count = 0;
                    state.success_count = 0;
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
            CircuitState::Open => {
                // Unreachable while calls hold the gate; only a concurrent reset() gets here.
                debug!("Success recorded while circuit is open");
            }
        }
    }

    fn on_failure(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();

        match state.current {
            CircuitState::Closed => {
                state.failure_count += 1;
                state.last_failure_at = Some(now);
                if state.failure_count >= self.config.failure_threshold {
                    warn!(failures = state.failure_count, "Circuit breaker opened");
                    state.success_count = 0;
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!("Circuit breaker reopened after failed trial call");
                state.failure_count = 0;
                state.success_count = 0;
                state.last_failure_at = Some(now);
                self.transition(&mut state, CircuitState::Open);
            }
            CircuitState::Open => {
                state.last_failure_at = Some(now);
            }
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.current;
        if from == to {
            return;
        }

        state.current = to;
        state.changed_at = self.clock.now();
        info!(from = %from, to = %to, "Circuit breaker state changed");
        self.notify_listener(from, to);
    }

    fn notify_listener(&self, from: CircuitState, to: CircuitState) {
        let Some(listener) = self.config.on_state_change.clone() else {
            return;
        };

        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || listener(from, to));
            }
            Err(_) => {
                let spawned = thread::Builder::new()
                    .name("breaker-state-listener".to_string())
                    .spawn(move || listener(from, to));
                if let Err(e) = spawned {
                    warn!(error = %e, "Failed to dispatch circuit breaker state change listener");
                }
            }
        }
    }

    /// Get the current state of the circuit breaker
    ///
    /// Never waits for an in-flight call.
    pub fn state(&self) -> CircuitState {
        self.state.lock().current
    }

    /// Get a snapshot of circuit breaker metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state.lock();
        CircuitBreakerMetrics {
            state: state.current,
            failure_count: state.failure_count,
            success_count: state.success_count,
            total_calls: self.total_calls.load(Ordering::Acquire),
            rejected_calls: self.rejected_calls.load(Ordering::Acquire),
            last_failure_time: state.last_failure_at,
            state_change_time: state.changed_at,
        }
    }

    /// The configuration this breaker was built with
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Force the circuit breaker back to closed state
    ///
    /// Administrative override; does not wait for an in-flight call.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.failure_count = 0;
        state.success_count = 0;
        state.last_failure_at = None;
        self.transition(&mut state, CircuitState::Closed);
        info!("Circuit breaker manually reset to closed state");
    }
}
