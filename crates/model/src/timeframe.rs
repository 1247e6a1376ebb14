//! The fixed set of bar timeframes the platform aggregates.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// A candle period. `Base` is whatever the collector's native cadence is
/// (default `OneMinute`); all others are roll-ups computed by the bar
/// builder from the base timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, Serialize, Deserialize)]
pub enum Timeframe {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    FourHours,
    OneDay,
}

impl Timeframe {
    /// The bucket period in milliseconds.
    #[must_use]
    pub const fn period_ms(self) -> i64 {
        match self {
            Self::OneMinute => 60_000,
            Self::FiveMinutes => 5 * 60_000,
            Self::FifteenMinutes => 15 * 60_000,
            Self::OneHour => 60 * 60_000,
            Self::FourHours => 4 * 60 * 60_000,
            Self::OneDay => 24 * 60 * 60_000,
        }
    }

    /// Short code used in cache keys and the wire protocol, e.g. `"5m"`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
        }
    }

    /// The base (finest) timeframe ticks are bucketed into before roll-up.
    #[must_use]
    pub const fn base() -> Self {
        Self::OneMinute
    }

    /// The roll-up targets built from the base timeframe, in ascending order.
    #[must_use]
    pub const fn rollup_targets() -> [Self; 5] {
        [
            Self::FiveMinutes,
            Self::FifteenMinutes,
            Self::OneHour,
            Self::FourHours,
            Self::OneDay,
        ]
    }

    /// Parses a code like `"1m"` back into a `Timeframe`.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "1m" => Some(Self::OneMinute),
            "5m" => Some(Self::FiveMinutes),
            "15m" => Some(Self::FifteenMinutes),
            "1h" => Some(Self::OneHour),
            "4h" => Some(Self::FourHours),
            "1d" => Some(Self::OneDay),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_code() {
        for tf in [
            Timeframe::OneMinute,
            Timeframe::FiveMinutes,
            Timeframe::FifteenMinutes,
            Timeframe::OneHour,
            Timeframe::FourHours,
            Timeframe::OneDay,
        ] {
            assert_eq!(Timeframe::parse(tf.code()), Some(tf));
        }
    }

    #[test]
    fn five_minute_bucket_is_five_base_buckets() {
        assert_eq!(
            Timeframe::FiveMinutes.period_ms(),
            5 * Timeframe::OneMinute.period_ms()
        );
    }
}
