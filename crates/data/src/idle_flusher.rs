//! Optional idle-flush task (disabled by default): force-closes a stale open
//! candle after a grace period instead of waiting for the next bucket's
//! first tick (spec §4.4 edge cases, §9 open question; SPEC_FULL §C).
//!
//! The core bar builder never does this on its own — a polled venue whose
//! market has closed mid-bucket leaves its last candle open until the next
//! session's first tick arrives, which the spec allows. Wiring this task in
//! is a deployment choice, not a default.

use std::sync::Arc;
use std::time::Duration;

use marketflow_core::clock::Clock;
use tracing::{debug, info};

use crate::bar_builder::{BarBuilder, Completion};

/// Configuration for [`IdleFlusher`]. Disabled unless explicitly enabled by
/// the caller — the core bar builder's contract does not require it.
#[derive(Debug, Clone, Copy)]
pub struct IdleFlusherConfig {
    pub enabled: bool,
    pub max_idle: Duration,
    pub check_interval: Duration,
}

impl Default for IdleFlusherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_idle: Duration::from_secs(15 * 60),
            check_interval: Duration::from_secs(60),
        }
    }
}

/// Periodically force-closes open candles idle past `max_idle`. Intended to
/// be driven by a `tokio::time::interval` loop in `marketflow-server`; this
/// type only owns the decision of *when* and *what* to flush.
pub struct IdleFlusher {
    config: IdleFlusherConfig,
    clock: Arc<dyn Clock>,
}

impl IdleFlusher {
    #[must_use]
    pub fn new(config: IdleFlusherConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        self.config.check_interval
    }

    /// Runs one flush pass against `builder`. A no-op (returns an empty
    /// `Vec`) when disabled, so callers can invoke this unconditionally from
    /// a timer loop without branching on `enabled()` themselves.
    pub fn tick(&self, builder: &mut BarBuilder) -> Vec<Completion> {
        if !self.config.enabled {
            return Vec::new();
        }
        let now_ms = self.clock.now_ms();
        let max_idle_ms = i64::try_from(self.config.max_idle.as_millis()).unwrap_or(i64::MAX);
        let completions = builder.force_close_idle(now_ms, max_idle_ms);
        if !completions.is_empty() {
            info!(count = completions.len(), "idle flusher force-closed stale candles");
        } else {
            debug!("idle flusher pass found nothing stale");
        }
        completions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketflow_core::clock::TestClock;
    use marketflow_model::{Trade, Venue};

    fn trade(ts_ms: i64) -> Trade {
        Trade {
            venue: Venue::CryptoStream,
            symbol: "BTC".to_string(),
            price: 100.0,
            quantity: 1.0,
            ts_ms,
            side_hint: None,
        }
    }

    #[test]
    fn disabled_flusher_is_a_no_op() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let flusher = IdleFlusher::new(IdleFlusherConfig::default(), clock);
        let mut builder = BarBuilder::new();
        builder.on_trade(&trade(0));
        assert!(flusher.tick(&mut builder).is_empty());
    }

    #[test]
    fn enabled_flusher_closes_stale_candle() {
        let now = chrono::Utc::now();
        let clock = Arc::new(TestClock::new(now));
        let config = IdleFlusherConfig {
            enabled: true,
            max_idle: Duration::from_secs(60),
            check_interval: Duration::from_secs(10),
        };
        let flusher = IdleFlusher::new(config, clock.clone());
        let mut builder = BarBuilder::new();
        builder.on_trade(&trade(now.timestamp_millis()));

        clock.advance(chrono::Duration::seconds(90));
        let completions = flusher.tick(&mut builder);
        assert_eq!(completions.len(), 1);
    }
}
