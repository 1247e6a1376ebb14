//! Real-time and test `Clock` capabilities.
//!
//! Every component that needs "now" takes a `Arc<dyn Clock>` rather than
//! calling `Utc::now()` directly, so market-hours gating, cooldown windows,
//! and circuit-breaker timeouts are deterministic under test. This mirrors
//! the teacher platform's `Clock` trait split between a live, wall-clock
//! implementation and a test implementation that only advances when told to.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// A source of "now", abstracted so tests can control time.
pub trait Clock: Debug + Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// Current time expressed in the given venue timezone.
    fn now_in(&self, tz: Tz) -> DateTime<Tz> {
        self.now().with_timezone(&tz)
    }

    /// Milliseconds since the Unix epoch, the wire unit used for ticks.
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall-clock `Clock` backed by `Utc::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A `Clock` whose time is set explicitly, for deterministic tests of
/// market-hours gating, cooldowns, and circuit-breaker timeouts.
#[derive(Debug)]
pub struct TestClock {
    ms: AtomicI64,
}

impl TestClock {
    /// Creates a `TestClock` fixed at the given instant.
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            ms: AtomicI64::new(at.timestamp_millis()),
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        self.ms.fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }

    /// Sets the clock to an explicit instant.
    pub fn set(&self, at: DateTime<Utc>) {
        self.ms.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.ms.load(Ordering::SeqCst))
            .expect("test clock holds a valid millisecond timestamp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_clock_advances_monotonically() {
        let clock = TestClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let t0 = clock.now();
        clock.advance(chrono::Duration::seconds(30));
        let t1 = clock.now();
        assert_eq!((t1 - t0).num_seconds(), 30);
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let t0 = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let t1 = clock.now();
        assert!(t1 >= t0);
    }
}
