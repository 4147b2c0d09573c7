//! Time abstraction shared by the breaker, retry executor and TTL cache
//!
//! Production code runs on [`SystemClock`]. Tests swap in [`MockClock`],
//! whose `sleep` advances virtual time instantly and records every requested
//! delay, so backoff schedules and expiry can be asserted without waiting.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Trait for time operations to enable deterministic testing
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

#[derive(Debug, Default)]
struct MockClockState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// Mock clock for deterministic testing
///
/// Clones share the same virtual timeline, so a clock handed to a component
/// can still be advanced from the test body.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    state: Arc<Mutex<MockClockState>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self::with_current_time(Instant::now())
    }

    /// Create a new mock clock with a specific start time
    pub fn with_current_time(start: Instant) -> Self {
        Self { start, state: Arc::new(Mutex::new(MockClockState::default())) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        self.state.lock().elapsed += duration;
    }

    /// Advance the mock clock by milliseconds (convenience method)
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        self.state.lock().elapsed = duration;
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Every duration passed to [`Clock::sleep`], in call order
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.state.lock().elapsed
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + self.state.lock().elapsed
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_now() {
        let clock = SystemClock;
        let now1 = clock.now();
        let now2 = clock.now();
        assert!(now2 >= now1, "System clock should advance");
    }

    #[test]
    fn test_system_clock_zero_sleep_returns_immediately() {
        let clock = SystemClock;
        let before = Instant::now();
        clock.sleep(Duration::ZERO);
        assert!(before.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(5));

        assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
    }

    /// Validates that mock sleeps move virtual time and are recorded in order.
    ///
    /// Assertions:
    /// - Confirms `clock.elapsed()` equals the sum of the sleeps.
    /// - Confirms `clock.recorded_sleeps()` lists each sleep in call order.
    #[test]
    fn test_mock_clock_sleep_records_and_advances() {
        let clock = MockClock::new();

        clock.sleep(Duration::from_millis(10));
        clock.sleep(Duration::from_millis(20));

        assert_eq!(clock.elapsed(), Duration::from_millis(30));
        assert_eq!(
            clock.recorded_sleeps(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[test]
    fn test_mock_clock_millis_since_epoch() {
        let clock = MockClock::new();
        clock.set_elapsed(Duration::from_millis(5000));

        assert_eq!(clock.millis_since_epoch(), 5000);
    }

    #[test]
    fn test_mock_clock_clone_shares_timeline() {
        let clock1 = MockClock::new();
        clock1.advance(Duration::from_secs(10));

        let clock2 = clock1.clone();
        clock2.advance_millis(5000);

        assert_eq!(clock1.elapsed(), Duration::from_secs(15));
        assert_eq!(clock2.elapsed(), Duration::from_secs(15));
    }

    #[test]
    fn test_arc_clock_delegates() {
        let clock = Arc::new(MockClock::new());
        Clock::sleep(&clock, Duration::from_millis(7));
        assert_eq!(clock.recorded_sleeps(), vec![Duration::from_millis(7)]);
    }
}
