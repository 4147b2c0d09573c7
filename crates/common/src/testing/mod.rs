//! Testing utilities and helpers
//!
//! - **[`assertions`]**: eventual-consistency and timing assertions
//! - **[`async_utils`]**: async polling and timeout helpers
//! - [`init_test_tracing`]: route `tracing` output to the test harness
//!   (requires the `test-utils` feature outside this crate's own tests)
//!
//! Deterministic time lives in [`crate::resilience::MockClock`].
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use bulwark_common::resilience::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! bulwark_common::testing::assert_duration_in_range(
//!     clock.now().duration_since(start),
//!     Duration::from_secs(5),
//!     Duration::ZERO,
//! );
//! ```

pub mod assertions;
pub mod async_utils;

pub use assertions::assert_duration_in_range;
pub use async_utils::{poll_until, timeout_ok};

/// Install a test-friendly `tracing` subscriber once per process
///
/// Output goes through the test writer so it is captured per test; the
/// filter comes from `RUST_LOG` and defaults to `debug` for this crate.
#[cfg(any(test, feature = "test-utils"))]
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bulwark_common=debug"));

    // A subscriber may already be installed by another test in this binary.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}
