//! Async testing utilities

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::time::Duration;

/// Await `fut`, failing with `Elapsed` if it takes longer than `duration`
pub async fn timeout_ok<F, T>(duration: Duration, fut: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await
}

/// Poll `condition` every `interval` until it returns true or `timeout`
/// passes. Returns whether the condition was met.
///
/// Timing uses tokio's clock, so this also works under a paused runtime.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }

    false
}
