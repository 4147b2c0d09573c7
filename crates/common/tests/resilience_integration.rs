//! Integration tests for the resilience module
//!
//! Exercises the circuit breaker and retry helpers through the public API
//! with real time, real threads and their composition.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use bulwark_common::error::{CommonError, CommonResult, ErrorClassification};
use bulwark_common::resilience::{
    retry, CircuitBreaker, CircuitBreakerConfig, CircuitState, MockClock, ResilienceError,
    RetryConfig, RetryError, RetryExecutor,
};
use bulwark_common::testing::{assert_duration_in_range, timeout_ok};
use tokio_util::sync::CancellationToken;

/// Custom error type for testing
#[derive(Debug, Clone, PartialEq, Eq)]
struct TestError {
    message: String,
}

impl TestError {
    fn new(message: &str) -> Self {
        Self { message: message.to_string() }
    }
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TestError {}

fn breaker(failures: u64, successes: u64, reset_timeout: Duration) -> CircuitBreaker {
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(failures)
        .success_threshold(successes)
        .reset_timeout(reset_timeout)
        .build()
        .expect("valid config");
    CircuitBreaker::new(config).expect("valid breaker")
}

/// Validates the full open / half-open / closed cycle with the system clock.
///
/// # Test Steps
/// 1. Trip a breaker with three failures
/// 2. Confirm the fourth call is rejected without running the operation
/// 3. Wait past the reset timeout and confirm a trial call runs
/// 4. Close the breaker with two trial successes
#[test]
fn test_circuit_breaker_full_cycle_with_system_clock() {
    let cb = breaker(3, 2, Duration::from_millis(50));
    let invoked = AtomicU32::new(0);

    for _ in 0..3 {
        let result = cb.call(|| -> Result<(), TestError> {
            invoked.fetch_add(1, Ordering::SeqCst);
            Err(TestError::new("connection refused"))
        });
        assert!(matches!(result, Err(ResilienceError::OperationFailed { .. })));
    }
    assert_eq!(cb.state(), CircuitState::Open);

    let rejected = cb.call(|| -> Result<(), TestError> {
        invoked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert!(rejected.unwrap_err().is_circuit_open());
    assert_eq!(invoked.load(Ordering::SeqCst), 3);

    thread::sleep(Duration::from_millis(60));

    cb.call(|| Ok::<_, TestError>(())).expect("trial call runs");
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    cb.call(|| Ok::<_, TestError>(())).expect("second trial call runs");
    assert_eq!(cb.state(), CircuitState::Closed);

    let metrics = cb.metrics();
    assert_eq!(metrics.rejected_calls, 1);
    assert_eq!(metrics.total_calls, 6);
}

/// Validates that the wrapped error comes back unmodified.
#[test]
fn test_circuit_breaker_preserves_operation_error() {
    let cb = CircuitBreaker::with_defaults();

    let err = cb.call(|| Err::<(), _>(TestError::new("smtp 421"))).unwrap_err();

    assert_eq!(err.to_string(), "Operation failed: smtp 421");
    assert_eq!(err.into_inner(), Some(TestError::new("smtp 421")));
}

/// Validates that calls through one breaker never overlap.
///
/// # Test Steps
/// 1. Run eight threads through the same breaker
/// 2. Track the number of operations in flight
/// 3. Confirm the maximum observed concurrency is one
#[test]
fn test_circuit_breaker_serializes_concurrent_callers() {
    let cb = breaker(100, 1, Duration::from_secs(1));
    let in_flight = Arc::new(AtomicU32::new(0));
    let max_seen = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cb = cb.clone();
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            thread::spawn(move || {
                for _ in 0..5 {
                    cb.call(|| {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(1));
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, TestError>(())
                    })
                    .expect("closed breaker admits calls");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread");
    }

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert_eq!(cb.metrics().total_calls, 40);
}

/// Validates that the state-change listener sees every transition.
///
/// # Test Steps
/// 1. Register a listener that forwards transitions over a channel
/// 2. Drive the breaker Closed -> Open -> HalfOpen -> Open with a mock clock
/// 3. Confirm the three transitions arrive (in any order, as they are
///    dispatched asynchronously)
#[test]
fn test_circuit_breaker_listener_observes_transitions() {
    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(1)
        .reset_timeout(Duration::from_millis(100))
        .on_state_change(move |from, to| {
            let _ = tx.lock().expect("listener channel").send((from, to));
        })
        .build()
        .expect("valid config");
    let clock = MockClock::new();
    let cb = CircuitBreaker::with_clock(config, clock.clone()).expect("valid breaker");

    let _ = cb.call(|| Err::<(), _>(TestError::new("down")));
    clock.advance(Duration::from_millis(100));
    let _ = cb.call(|| Err::<(), _>(TestError::new("still down")));

    let mut seen: Vec<_> =
        (0..3).map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("transition")).collect();
    seen.sort_by_key(|(from, to)| (from.to_string(), to.to_string()));

    assert_eq!(
        seen,
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::HalfOpen, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
        ]
    );
}

/// Validates that a cancelled async call records neither success nor failure.
#[tokio::test]
async fn test_circuit_breaker_dropped_call_records_nothing() {
    let cb = breaker(1, 1, Duration::from_secs(60));

    let timed_out = timeout_ok(
        Duration::from_millis(20),
        cb.execute(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err::<(), _>(TestError::new("never returned"))
        }),
    )
    .await;
    assert!(timed_out.is_err());

    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.metrics().failure_count, 0);

    let value = cb.execute(|| async { Ok::<_, TestError>(5) }).await.expect("gate released");
    assert_eq!(value, 5);
}

/// Validates the documented retry schedule with real sleeps.
///
/// # Test Steps
/// 1. Retry an always-failing operation four times with a 10ms base delay
/// 2. Confirm four calls with indices 0..3
/// 3. Confirm roughly 10 + 20 + 40 ms elapsed
#[test]
fn test_retry_always_failing_real_time() {
    let started = Instant::now();
    let mut seen = Vec::new();

    let result: Result<(), RetryError<TestError>> = retry(
        |attempt| {
            seen.push(attempt);
            Err(TestError::new("unavailable"))
        },
        4,
        Duration::from_millis(10),
    );

    assert_eq!(seen, vec![0, 1, 2, 3]);
    // At least the 70ms of backoff, with headroom for a busy scheduler.
    assert_duration_in_range(
        started.elapsed(),
        Duration::from_millis(170),
        Duration::from_millis(100),
    );
    match result {
        Err(RetryError::Exhausted { attempts, source }) => {
            assert_eq!(attempts, 4);
            assert_eq!(source, TestError::new("unavailable"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

/// Validates collapsing breaker errors into `CommonError` with `?`.
///
/// Assertions:
/// - Confirms an operation failure becomes a retryable `Upstream` error.
/// - Confirms a rejection becomes `CircuitOpen` carrying the remaining
///   cool-down.
#[test]
fn test_breaker_errors_convert_to_common_error() {
    let clock = MockClock::new();
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(1)
        .reset_timeout(Duration::from_secs(30))
        .build()
        .expect("valid config");
    let cb = CircuitBreaker::with_clock(config, clock.clone()).expect("valid breaker");

    let fetch = |cb: &CircuitBreaker<MockClock>| -> CommonResult<u32> {
        Ok(cb.call(|| Err::<u32, _>(TestError::new("connection refused")))?)
    };

    let failed = fetch(&cb).unwrap_err();
    assert_eq!(failed, CommonError::upstream("circuit_breaker", "connection refused"));
    assert!(failed.is_retryable());

    clock.advance(Duration::from_secs(10));
    let rejected = CommonError::from_breaker(
        "inventory",
        cb.call(|| Ok::<_, TestError>(1)).unwrap_err(),
    );
    assert_eq!(rejected.retry_after(), Some(Duration::from_secs(20)));
    assert_eq!(rejected.to_string(), "Circuit breaker open for 'inventory' (retry in 20s)");
}

/// Validates that a retry can be wrapped in a breaker and both errors remain
/// inspectable.
#[test]
fn test_breaker_around_retry_composition() {
    let cb = breaker(2, 1, Duration::from_secs(60));
    let calls = AtomicU32::new(0);

    for _ in 0..2 {
        let err = cb
            .call(|| {
                retry(
                    |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(TestError::new("db timeout"))
                    },
                    3,
                    Duration::ZERO,
                )
            })
            .unwrap_err();

        let retry_err = err.into_inner().expect("operation ran");
        assert_eq!(retry_err.attempts(), 3);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(cb.state(), CircuitState::Open);
    assert!(cb.call(|| retry(|_| Ok::<_, TestError>(()), 3, Duration::ZERO)).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

/// Validates cancellation of an async retry loop from another task.
#[tokio::test(start_paused = true)]
async fn test_retry_executor_cancellation() {
    let config = RetryConfig::builder()
        .max_attempts(10)
        .initial_delay(Duration::from_millis(100))
        .build()
        .expect("valid config");
    let executor = RetryExecutor::new(config);
    let token = CancellationToken::new();
    let attempts = Arc::new(AtomicU32::new(0));

    let canceller = token.clone();
    tokio::spawn(async move {
        // Lands during the third backoff (after 100ms + 200ms of sleeping).
        tokio::time::sleep(Duration::from_millis(350)).await;
        canceller.cancel();
    });

    let counter = Arc::clone(&attempts);
    let result: Result<(), RetryError<TestError>> = executor
        .execute_async_with_cancel(
            move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::new("flaky"))
                }
            },
            &token,
        )
        .await;

    assert!(matches!(result, Err(RetryError::Cancelled { attempts: 3 })));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

/// Validates the total-time budget with the blocking executor.
#[test]
fn test_retry_executor_deadline() {
    let clock = MockClock::new();
    let config = RetryConfig::builder()
        .max_attempts(10)
        .initial_delay(Duration::from_millis(100))
        .max_total_time(Duration::from_millis(1000))
        .build()
        .expect("valid config");

    let result: Result<(), RetryError<TestError>> =
        RetryExecutor::with_clock(config, clock.clone()).execute(|_| Err(TestError::new("down")));

    // 100 + 200 + 400 = 700; the next 800ms sleep would overrun the budget.
    assert_eq!(clock.elapsed(), Duration::from_millis(700));
    assert!(matches!(result, Err(RetryError::DeadlineExceeded { attempts: 4, .. })));
}
