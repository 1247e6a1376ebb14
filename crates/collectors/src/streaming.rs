//! The `Streaming` venue variant: push-based multiplexed trade/kline feed
//! with a 24h hard reconnect and a 1200 req/min REST backfill budget (spec
//! §4.2).

use std::sync::Arc;
use std::time::Duration;

use marketflow_core::clock::Clock;
use marketflow_data::QualityChecker;
use marketflow_infrastructure::circuit_breaker::CircuitBreaker;
use marketflow_model::Venue;
use tokio::sync::mpsc;

use crate::collector::CollectorRunner;
use crate::ws_source::WsJsonSource;

/// Hard reconnect cadence regardless of error state (spec §4.2).
pub const HARD_RECONNECT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
/// REST backfill budget shared across a streaming venue's historical fetches.
pub const BACKFILL_REQUESTS_PER_MINUTE: f64 = 1200.0;

/// Builds a [`CollectorRunner`] configured for the streaming venue: no
/// market-hours gate, a 24h forced reconnect, and whatever poll cadence the
/// underlying socket naturally delivers at (`poll()` blocks on the next
/// frame rather than a fixed interval).
#[must_use]
pub fn build_streaming_collector(
    name: impl Into<String>,
    source: WsJsonSource,
    symbols: Vec<String>,
    breaker: Arc<CircuitBreaker>,
    quality: Arc<tokio::sync::Mutex<QualityChecker>>,
    clock: Arc<dyn Clock>,
    bus_tx: mpsc::UnboundedSender<marketflow_model::BusMessage>,
) -> CollectorRunner<WsJsonSource> {
    CollectorRunner::new(name, Venue::CryptoStream, source, symbols, breaker, quality, clock, bus_tx)
        .with_hard_reconnect_after(HARD_RECONNECT_INTERVAL)
        .with_poll_interval(Duration::from_millis(0))
}
