//! Timestamp bucketing helpers shared by the bar builder and indicator engine.

use chrono::{DateTime, Utc};

/// Floors a millisecond timestamp to the start of its `period_ms` bucket:
/// `floor(t / period_ms) * period_ms`.
#[must_use]
pub fn bucket_start_ms(ts_ms: i64, period_ms: i64) -> i64 {
    debug_assert!(period_ms > 0, "period_ms must be positive");
    ts_ms.div_euclid(period_ms) * period_ms
}

/// Floors a `DateTime<Utc>` to the start of its `period_ms` bucket.
#[must_use]
pub fn bucket_start(ts: DateTime<Utc>, period_ms: i64) -> DateTime<Utc> {
    let floored = bucket_start_ms(ts.timestamp_millis(), period_ms);
    DateTime::from_timestamp_millis(floored).expect("bucketed timestamp is in range")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floors_to_bucket_start() {
        // 1m buckets, ts at 90s falls into the 60s bucket.
        assert_eq!(bucket_start_ms(90_000, 60_000), 60_000);
        assert_eq!(bucket_start_ms(60_000, 60_000), 60_000);
        assert_eq!(bucket_start_ms(59_999, 60_000), 0);
    }

    #[test]
    fn boundary_tick_belongs_to_new_bucket() {
        // exactly on the boundary -> new bucket, not the previous one
        assert_eq!(bucket_start_ms(120_000, 60_000), 120_000);
        assert_ne!(bucket_start_ms(120_000, 60_000), 60_000);
    }
}
