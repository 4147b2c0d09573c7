//! Resilience benchmarks
//!
//! Circuit breaker admission on the hot paths, the async execute path and
//! the retry loop with a mock clock so backoff sleeps cost nothing.
//!
//! Run with: `cargo bench --bench resilience_bench -p bulwark-common`

use std::time::Duration;

use bulwark_common::resilience::{
    backoff_delay, CircuitBreaker, CircuitBreakerConfigBuilder, MockClock, ResilienceError,
    RetryConfig, RetryExecutor,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Builder as RuntimeBuilder;

// ============================================================================
// Circuit Breaker Benchmarks
// ============================================================================

fn bench_circuit_breaker_sync_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_sync_paths");

    group.bench_function("call_success", |b| {
        let breaker = CircuitBreaker::with_defaults();
        b.iter(|| {
            let result: Result<_, ResilienceError<std::io::Error>> =
                breaker.call(|| Ok::<_, std::io::Error>(()));
            if let Err(err) = result {
                panic!("circuit breaker success path failed: {err}");
            }
        });
    });

    group.bench_function("call_fail_to_open", |b| {
        b.iter(|| {
            let config = CircuitBreakerConfigBuilder::new()
                .failure_threshold(5)
                .reset_timeout(Duration::from_secs(30))
                .build()
                .expect("valid circuit breaker config for benchmarks");
            let breaker = CircuitBreaker::new(config).expect("valid breaker");

            for _ in 0..5 {
                let result: Result<(), ResilienceError<std::io::Error>> =
                    breaker.call(|| Err(std::io::Error::other("benchmark failure")));
                let _result = black_box(result);
            }

            black_box(breaker.state());
        });
    });

    group.bench_function("call_rejected_while_open", |b| {
        let config = CircuitBreakerConfigBuilder::new()
            .failure_threshold(1)
            .reset_timeout(Duration::from_secs(3600))
            .build()
            .expect("valid circuit breaker config for benchmarks");
        let breaker = CircuitBreaker::new(config).expect("valid breaker");
        let _ = breaker.call(|| Err::<(), _>(std::io::Error::other("trip")));

        b.iter(|| {
            let result: Result<(), ResilienceError<std::io::Error>> = breaker.call(|| Ok(()));
            black_box(result.is_err());
        });
    });

    group.bench_function("metrics_snapshot", |b| {
        let breaker = CircuitBreaker::with_defaults();
        b.iter(|| black_box(breaker.metrics()));
    });

    group.finish();
}

fn bench_circuit_breaker_async(c: &mut Criterion) {
    let runtime = RuntimeBuilder::new_current_thread()
        .enable_time()
        .build()
        .expect("benchmark runtime");
    let breaker = CircuitBreaker::with_defaults();

    c.bench_function("circuit_breaker_execute_success", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let value = breaker
                    .execute(|| async { Ok::<_, std::io::Error>(42_u32) })
                    .await
                    .expect("closed breaker admits calls");
                black_box(value);
            });
        });
    });
}

// ============================================================================
// Retry Benchmarks
// ============================================================================

fn bench_backoff_delay(c: &mut Criterion) {
    c.bench_function("backoff_delay", |b| {
        b.iter(|| {
            for attempt in 0..32 {
                black_box(backoff_delay(Duration::from_millis(100), black_box(attempt)));
            }
        });
    });
}

fn bench_retry_attempts(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_always_failing");

    for attempts in [1_u32, 3, 10] {
        group.bench_with_input(BenchmarkId::from_parameter(attempts), &attempts, |b, &attempts| {
            let config = RetryConfig {
                max_attempts: attempts,
                initial_delay: Duration::from_millis(10),
                max_total_time: None,
            };

            b.iter(|| {
                // Fresh clock per run so recorded sleeps do not accumulate.
                let executor = RetryExecutor::with_clock(config.clone(), MockClock::new());
                let result: Result<(), _> =
                    executor.execute(|_| Err(std::io::Error::other("unavailable")));
                black_box(result.is_err());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_circuit_breaker_sync_paths,
    bench_circuit_breaker_async,
    bench_backoff_delay,
    bench_retry_attempts
);
criterion_main!(benches);
