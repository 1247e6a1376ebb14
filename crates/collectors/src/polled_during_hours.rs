//! The `PolledDuringHours` venue variant: refuses to run outside the
//! session window, reopen-checked every 60 s (spec §4.2).

use std::sync::Arc;
use std::time::Duration;

use marketflow_core::clock::Clock;
use marketflow_data::QualityChecker;
use marketflow_infrastructure::circuit_breaker::CircuitBreaker;
use marketflow_model::Venue;
use tokio::sync::mpsc;

use crate::collector::{CollectorRunner, RunGate};
use crate::market_clock::MarketClock;
use crate::rest_source::RestPollSource;

/// Polling cadence during an open session (spec §4.2: "60 s cadence").
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);
/// How often a closed market is re-checked for reopening.
pub const REOPEN_CHECK_INTERVAL: Duration = Duration::from_secs(60);

struct MarketHoursGate(MarketClock);

impl RunGate for MarketHoursGate {
    fn should_run(&self, clock: &Arc<dyn Clock>) -> bool {
        self.0.is_open(clock)
    }

    fn recheck_interval(&self) -> Duration {
        REOPEN_CHECK_INTERVAL
    }
}

#[must_use]
pub fn build_polled_during_hours_collector(
    name: impl Into<String>,
    source: RestPollSource,
    symbols: Vec<String>,
    breaker: Arc<CircuitBreaker>,
    quality: Arc<tokio::sync::Mutex<QualityChecker>>,
    clock: Arc<dyn Clock>,
    bus_tx: mpsc::UnboundedSender<marketflow_model::BusMessage>,
    market_clock: MarketClock,
) -> CollectorRunner<RestPollSource> {
    CollectorRunner::new(name, Venue::EquityPolled, source, symbols, breaker, quality, clock, bus_tx)
        .with_poll_interval(POLL_INTERVAL)
        .with_gate(Box::new(MarketHoursGate(market_clock)))
}
