//! The `PolledRateLimited` venue variant: a fixed 5 req/min token budget,
//! 429 backoff capped at 5 min, publishing the previous close as a daily
//! bar (spec §4.2).

use std::sync::Arc;
use std::time::Duration;

use marketflow_core::clock::Clock;
use marketflow_data::QualityChecker;
use marketflow_infrastructure::circuit_breaker::CircuitBreaker;
use marketflow_infrastructure::CacheClient;
use marketflow_model::Venue;
use tokio::sync::mpsc;

use crate::collector::{CollectorRunner, ReconnectBackoff};
use crate::rate_limiter::{RateLimitedSource, RateLimiter};
use crate::rest_source::RestPollSource;

/// Token budget (spec §4.2: "fixed token rate (e.g., 5 req/min)").
pub const REQUESTS_PER_MINUTE: f64 = 5.0;
/// Cap on 429 backoff (spec §4.2).
pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);
/// Polling cadence, matched to the token budget's period.
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

#[must_use]
pub fn build_polled_rate_limited_collector(
    name: impl Into<String>,
    source: RestPollSource,
    symbols: Vec<String>,
    breaker: Arc<CircuitBreaker>,
    quality: Arc<tokio::sync::Mutex<QualityChecker>>,
    clock: Arc<dyn Clock>,
    bus_tx: mpsc::UnboundedSender<marketflow_model::BusMessage>,
    cache: Arc<CacheClient>,
    client_id: impl Into<String>,
) -> CollectorRunner<RateLimitedSource<RestPollSource>> {
    let limiter = RateLimiter::new(cache, clock.clone(), REQUESTS_PER_MINUTE, REQUESTS_PER_MINUTE, 60);
    let rate_limited = RateLimitedSource::new(source, limiter, client_id);
    CollectorRunner::new(name, Venue::EquityEod, rate_limited, symbols, breaker, quality, clock, bus_tx)
        .with_poll_interval(POLL_INTERVAL)
        .with_backoff(ReconnectBackoff { initial: Duration::from_secs(1), multiplier: 2.0, max: MAX_BACKOFF })
}
