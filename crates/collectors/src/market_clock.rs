//! Market-hours gating for polled venues (spec §4.2, §9 "Market clocks").
//!
//! Abstracted behind [`MarketClock::is_open`] rather than each collector
//! hand-rolling timezone/weekday arithmetic, so tests can inject a fixed
//! `now` via `marketflow_core::clock::TestClock` and assert gating at exact
//! boundaries.

use chrono::{Datelike, NaiveTime, Weekday};
use chrono_tz::Tz;
use marketflow_core::clock::Clock;
use std::sync::Arc;

/// A `[open, close]` trading window, Monday-to-Friday, in a single venue
/// timezone. Holidays are out of scope (spec §1 non-goal: no calendar
/// service re-specified here).
#[derive(Debug, Clone, Copy)]
pub struct MarketClock {
    pub timezone: Tz,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl MarketClock {
    #[must_use]
    pub const fn new(timezone: Tz, open: NaiveTime, close: NaiveTime) -> Self {
        Self { timezone, open, close }
    }

    /// US-equity-style session: 09:30-16:00 America/New_York, weekdays.
    #[must_use]
    pub fn us_equity_regular_hours() -> Self {
        Self::new(
            chrono_tz::America::New_York,
            NaiveTime::from_hms_opt(9, 30, 0).expect("valid time"),
            NaiveTime::from_hms_opt(16, 0, 0).expect("valid time"),
        )
    }

    /// Whether the session is open at `clock`'s current instant.
    #[must_use]
    pub fn is_open(&self, clock: &Arc<dyn Clock>) -> bool {
        let local = clock.now_in(self.timezone);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let t = local.time();
        t >= self.open && t < self.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use marketflow_core::clock::TestClock;

    fn clock_at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Arc<dyn Clock> {
        let utc = chrono_tz::America::New_York
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&chrono::Utc);
        Arc::new(TestClock::new(utc))
    }

    #[test]
    fn open_during_regular_session() {
        let mc = MarketClock::us_equity_regular_hours();
        // Tuesday 10:00 ET
        assert!(mc.is_open(&clock_at(2024, 6, 4, 10, 0)));
    }

    #[test]
    fn closed_before_open() {
        let mc = MarketClock::us_equity_regular_hours();
        assert!(!mc.is_open(&clock_at(2024, 6, 4, 9, 0)));
    }

    #[test]
    fn closed_on_weekend() {
        let mc = MarketClock::us_equity_regular_hours();
        assert!(!mc.is_open(&clock_at(2024, 6, 8, 10, 0)));
    }

    #[test]
    fn closed_at_close_boundary() {
        let mc = MarketClock::us_equity_regular_hours();
        assert!(!mc.is_open(&clock_at(2024, 6, 4, 16, 0)));
    }
}
