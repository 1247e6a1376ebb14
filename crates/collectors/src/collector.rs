//! The shared collector run-loop (spec §4.2): connect under a circuit
//! breaker, subscribe, consume the venue, quality-check and publish each
//! tick, report health every 30 s, and reconnect with exponential backoff
//! on any source error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marketflow_core::clock::Clock;
use marketflow_core::error::{MarketFlowError, Result};
use marketflow_data::QualityChecker;
use marketflow_infrastructure::circuit_breaker::{CircuitBreaker, GuardError};
use marketflow_model::{BusMessage, Candle, HealthReport, Timeframe, Trade, TradeMessage, Venue};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One normalized event a [`VenueSource`] can produce per poll.
#[derive(Debug, Clone)]
pub enum CollectedEvent {
    Tick(Trade),
    /// An exchange-delivered bar that bypasses the bar builder entirely
    /// (spec §4.2 step 4: "For exchange-delivered bars, publish to
    /// `bars:completed`").
    Bar { symbol: String, candle: Candle },
}

/// The venue-specific half of a collector: everything this trait does not
/// cover (quality checking, publishing, health, backoff, reconnection) is
/// identical across venues and lives in [`CollectorRunner`].
#[async_trait]
pub trait VenueSource: Send + Sync {
    async fn connect(&mut self) -> Result<()>;
    async fn subscribe(&mut self, symbols: &[String]) -> Result<()>;
    /// One unit of consumption: blocks for a streaming source until at
    /// least one event is available, or performs one REST round-trip for
    /// a polled source. An empty vec is a valid "nothing new" result.
    async fn poll(&mut self) -> Result<Vec<CollectedEvent>>;
    async fn fetch_historical(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
    async fn disconnect(&mut self) -> Result<()>;
}

/// The backoff sequence a collector walks on consecutive source errors:
/// `[d0, d0*m, d0*m^2, ...]` capped at `d_max` (spec §4.2 step 5).
#[derive(Debug, Clone, Copy)]
pub struct ReconnectBackoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self { initial: Duration::from_millis(500), multiplier: 2.0, max: Duration::from_secs(30) }
    }
}

impl ReconnectBackoff {
    #[must_use]
    pub fn delay_for(&self, consecutive_errors: u32) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(consecutive_errors.saturating_sub(1) as i32);
        Duration::from_secs_f64(scaled.min(self.max.as_secs_f64()))
    }
}

#[derive(Debug, Default)]
struct Stats {
    trades_received: AtomicU64,
    errors: AtomicU64,
    reconnects: AtomicU64,
}

/// Optional gate checked before each poll; when it returns `false` the
/// runner idles rather than calling into the source (spec §4.2:
/// "Polled-during-hours venue: refuses to run while the market clock is
/// closed").
pub trait RunGate: Send + Sync {
    fn should_run(&self, clock: &Arc<dyn Clock>) -> bool;
    /// How long to sleep before re-checking the gate when it is closed.
    fn recheck_interval(&self) -> Duration {
        Duration::from_secs(60)
    }
}

/// Drives one [`VenueSource`] through the shared lifecycle. Generic over
/// the source so each venue variant only supplies its wire-protocol glue.
pub struct CollectorRunner<S: VenueSource> {
    name: String,
    venue: Venue,
    source: S,
    symbols: Vec<String>,
    breaker: Arc<CircuitBreaker>,
    quality: Arc<tokio::sync::Mutex<QualityChecker>>,
    clock: Arc<dyn Clock>,
    bus_tx: mpsc::UnboundedSender<BusMessage>,
    gate: Option<Box<dyn RunGate>>,
    poll_interval: Duration,
    health_interval: Duration,
    hard_reconnect_after: Option<Duration>,
    backoff: ReconnectBackoff,
    stats: Stats,
    started_at: DateTime<Utc>,
}

impl<S: VenueSource> CollectorRunner<S> {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        venue: Venue,
        source: S,
        symbols: Vec<String>,
        breaker: Arc<CircuitBreaker>,
        quality: Arc<tokio::sync::Mutex<QualityChecker>>,
        clock: Arc<dyn Clock>,
        bus_tx: mpsc::UnboundedSender<BusMessage>,
    ) -> Self {
        let now = clock.now();
        Self {
            name: name.into(),
            venue,
            source,
            symbols,
            breaker,
            quality,
            clock,
            bus_tx,
            gate: None,
            poll_interval: Duration::from_secs(60),
            health_interval: Duration::from_secs(30),
            hard_reconnect_after: None,
            backoff: ReconnectBackoff::default(),
            stats: Stats::default(),
            started_at: now,
        }
    }

    #[must_use]
    pub fn with_gate(mut self, gate: Box<dyn RunGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_hard_reconnect_after(mut self, interval: Duration) -> Self {
        self.hard_reconnect_after = Some(interval);
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs until `shutdown` fires. Implements spec §4.2's six-step
    /// run-loop; returns once a graceful shutdown has drained in-flight
    /// work.
    pub async fn run(&mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut health_tick = tokio::time::interval(self.health_interval);
        let mut consecutive_errors: u32 = 0;
        let mut connected_at = self.clock.now();

        loop {
            if *shutdown.borrow() {
                let _ = self.source.disconnect().await;
                break;
            }

            if let Some(gate) = &self.gate {
                if !gate.should_run(&self.clock) {
                    tokio::select! {
                        _ = tokio::time::sleep(gate.recheck_interval()) => {}
                        _ = shutdown.changed() => {}
                        _ = health_tick.tick() => self.publish_health(false),
                    }
                    continue;
                }
            }

            let connect_result = self
                .breaker
                .guard(|| self.source.connect())
                .await;

            match connect_result {
                Ok(()) => {}
                Err(GuardError::Open { retry_after, .. }) => {
                    tokio::select! {
                        _ = tokio::time::sleep(retry_after) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }
                Err(GuardError::Inner(err)) => {
                    warn!(component = %self.name, error = %err, "connect failed");
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    consecutive_errors += 1;
                    self.sleep_backoff(consecutive_errors, &mut shutdown).await;
                    continue;
                }
            }

            if let Err(err) = self.source.subscribe(&self.symbols).await {
                warn!(component = %self.name, error = %err, "subscribe failed");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                consecutive_errors += 1;
                let _ = self.source.disconnect().await;
                self.sleep_backoff(consecutive_errors, &mut shutdown).await;
                continue;
            }

            connected_at = self.clock.now();
            consecutive_errors = 0;
            info!(component = %self.name, "collector connected");

            'consume: loop {
                if *shutdown.borrow() {
                    let _ = self.source.disconnect().await;
                    return;
                }

                if let Some(max_age) = self.hard_reconnect_after {
                    if (self.clock.now() - connected_at).to_std().unwrap_or_default() >= max_age {
                        info!(component = %self.name, "hard reconnect interval elapsed");
                        let _ = self.source.disconnect().await;
                        self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                        break 'consume;
                    }
                }

                tokio::select! {
                    poll_result = self.source.poll() => {
                        match poll_result {
                            Ok(events) => self.handle_events(events).await,
                            Err(err) => {
                                warn!(component = %self.name, error = %err, "source error, disconnecting");
                                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                                let _ = self.source.disconnect().await;
                                self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                                consecutive_errors += 1;
                                break 'consume;
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        let _ = self.source.disconnect().await;
                        return;
                    }
                    _ = health_tick.tick() => self.publish_health(true),
                }

                // Polled sources pace successive round-trips by
                // `poll_interval`; a streaming source sets this to zero
                // since `poll()` itself blocks on the next socket frame.
                if !self.poll_interval.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }

            if consecutive_errors > 0 {
                self.sleep_backoff(consecutive_errors, &mut shutdown).await;
            }
        }
    }

    async fn handle_events(&mut self, events: Vec<CollectedEvent>) {
        let now = self.clock.now();
        for event in events {
            match event {
                CollectedEvent::Tick(trade) => {
                    let outcome = self.quality.lock().await.check(&trade, now);
                    if outcome.result.is_accepted() {
                        self.stats.trades_received.fetch_add(1, Ordering::Relaxed);
                        let msg = BusMessage::Trade(TradeMessage { symbol: trade.symbol.clone(), trade });
                        if self.bus_tx.send(msg).is_err() {
                            warn!(component = %self.name, "bus receiver dropped, discarding tick");
                        }
                    }
                }
                CollectedEvent::Bar { symbol, candle } => {
                    let msg = BusMessage::BarCompleted(marketflow_model::BarCompleted {
                        symbol,
                        venue: self.venue,
                        candle,
                    });
                    if self.bus_tx.send(msg).is_err() {
                        warn!(component = %self.name, "bus receiver dropped, discarding bar");
                    }
                }
            }
        }
    }

    fn publish_health(&self, connected: bool) {
        let uptime_secs = (self.clock.now() - self.started_at).num_seconds().max(0) as u64;
        let report = HealthReport {
            component: self.name.clone(),
            running: true,
            connected,
            trades_received: self.stats.trades_received.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            reconnects: self.stats.reconnects.load(Ordering::Relaxed),
            cb_state: format!("{:?}", self.breaker.state()),
            uptime_secs,
        };
        info!(component = %self.name, ?report, "collector health");
        let _ = self.bus_tx.send(BusMessage::Health(report));
    }

    async fn sleep_backoff(&self, consecutive_errors: u32, shutdown: &mut tokio::sync::watch::Receiver<bool>) {
        let delay = self.backoff.delay_for(consecutive_errors);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketflow_core::clock::TestClock;
    use marketflow_infrastructure::circuit_breaker::CircuitBreakerConfig;

    struct ScriptedSource {
        connect_calls: u32,
        events: Vec<Result<Vec<CollectedEvent>>>,
    }

    #[async_trait]
    impl VenueSource for ScriptedSource {
        async fn connect(&mut self) -> Result<()> {
            self.connect_calls += 1;
            Ok(())
        }
        async fn subscribe(&mut self, _symbols: &[String]) -> Result<()> {
            Ok(())
        }
        async fn poll(&mut self) -> Result<Vec<CollectedEvent>> {
            if self.events.is_empty() {
                return Ok(vec![]);
            }
            self.events.remove(0)
        }
        async fn fetch_historical(
            &mut self,
            _symbol: &str,
            _timeframe: Timeframe,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<Candle>> {
            Ok(vec![])
        }
        async fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_tick_reaches_the_bus() {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(chrono::Utc::now()));
        let trade = Trade {
            venue: Venue::CryptoStream,
            symbol: "BTC".into(),
            price: 100.0,
            quantity: 1.0,
            ts_ms: clock.now_ms(),
            side_hint: None,
        };
        let source = ScriptedSource {
            connect_calls: 0,
            events: vec![Ok(vec![CollectedEvent::Tick(trade)]), Err(MarketFlowError::Transport(std::io::Error::other("boom")))],
        };
        let breaker = Arc::new(CircuitBreaker::new("test", CircuitBreakerConfig::default(), clock.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runner = CollectorRunner::new(
            "test-collector",
            Venue::CryptoStream,
            source,
            vec!["BTC".into()],
            breaker,
            Arc::new(tokio::sync::Mutex::new(QualityChecker::new(1))),
            clock,
            tx,
        );
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(async move {
            runner.run(shutdown_rx).await;
        });

        let first = rx.recv().await.expect("tick published");
        assert!(matches!(first, BusMessage::Trade(_)));

        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }
}
