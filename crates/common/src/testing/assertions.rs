//! Custom assertions for testing
//!
//! Provides assertion macros and functions for timing-sensitive scenarios
//! such as background sweeps and asynchronous state-change listeners.

// These assertions panic on failure; that is their purpose.
#![allow(clippy::missing_panics_doc)]

use std::time::Duration;

/// Assert that a condition eventually becomes true within a timeout
///
/// The condition is re-evaluated every 10ms on the calling thread.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let flag = Arc::new(AtomicBool::new(false));
/// let setter = Arc::clone(&flag);
/// std::thread::spawn(move || setter.store(true, Ordering::SeqCst));
///
/// bulwark_common::assert_eventually!(Duration::from_secs(1), flag.load(Ordering::SeqCst));
/// ```
#[macro_export]
macro_rules! assert_eventually {
    ($timeout:expr, $condition:expr) => {{
        let start = std::time::Instant::now();
        let timeout = $timeout;
        let mut last_value = false;

        while start.elapsed() < timeout {
            last_value = $condition;
            if last_value {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        assert!(last_value, "Condition did not become true within {:?}", timeout);
    }};
}

/// Assert that `actual` is within `tolerance` of `expected`
pub fn assert_duration_in_range(actual: Duration, expected: Duration, tolerance: Duration) {
    let lower = expected.saturating_sub(tolerance);
    let upper = expected.saturating_add(tolerance);
    assert!(
        actual >= lower && actual <= upper,
        "Duration {:?} not within {:?} of {:?}",
        actual,
        tolerance,
        expected
    );
}
