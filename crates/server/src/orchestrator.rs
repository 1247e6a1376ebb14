//! Indicator Engine orchestration (spec §4.5): recomputes the fixed
//! indicator set on every `bars:completed` event and drives the chain of
//! side effects (persist, cache, publish, alert, feature) strictly after
//! compute.
//!
//! Ordering is enforced per `(symbol, timeframe)` by giving each key its
//! own task fed from its own unbounded channel: a single consumer over a
//! FIFO queue guarantees bar `bₙ` finishes before `bₙ₊₁` is observable,
//! the same "one owner per key" shape as the bar builder and quality
//! checker.

use std::sync::Arc;

use dashmap::DashMap;
use marketflow_alerts::AlertEngine;
use marketflow_collectors::MarketClock;
use marketflow_core::clock::Clock;
use marketflow_infrastructure::{CacheClient, TimeseriesStore};
use marketflow_model::{BarCompleted, BusMessage, ChartUpdate, FeatureRow, Timeframe, Venue, FEATURE_VERSION};
use tokio::sync::mpsc;

type Key = (String, Timeframe);

pub struct IndicatorOrchestrator {
    cache: Arc<CacheClient>,
    store: Arc<TimeseriesStore>,
    alerts: Arc<AlertEngine>,
    clock: Arc<dyn Clock>,
    market_clock: MarketClock,
    bus_tx: mpsc::UnboundedSender<BusMessage>,
    window: usize,
    workers: DashMap<Key, mpsc::UnboundedSender<BarCompleted>>,
}

impl IndicatorOrchestrator {
    #[must_use]
    pub fn new(
        cache: Arc<CacheClient>,
        store: Arc<TimeseriesStore>,
        alerts: Arc<AlertEngine>,
        clock: Arc<dyn Clock>,
        bus_tx: mpsc::UnboundedSender<BusMessage>,
        window: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            cache,
            store,
            alerts,
            clock,
            market_clock: MarketClock::us_equity_regular_hours(),
            bus_tx,
            window,
            workers: DashMap::new(),
        })
    }

    /// Routes `bar` to the worker for its `(symbol, timeframe)`, spawning
    /// one lazily on first use.
    pub fn submit(self: &Arc<Self>, bar: BarCompleted) {
        let key: Key = (bar.symbol.clone(), bar.candle.timeframe);
        let tx = self
            .workers
            .entry(key.clone())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                let this = Arc::clone(self);
                tokio::spawn(this.run_worker(rx));
                tx
            })
            .clone();
        if tx.send(bar).is_err() {
            tracing::error!("indicator worker channel closed unexpectedly");
        }
    }

    async fn run_worker(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<BarCompleted>) {
        while let Some(bar) = rx.recv().await {
            self.process(bar).await;
        }
    }

    fn market_open_for(&self, venue: Venue) -> bool {
        match venue {
            Venue::CryptoStream => true,
            Venue::EquityPolled | Venue::EquityEod => self.market_clock.is_open(&self.clock),
        }
    }

    async fn process(&self, bar: BarCompleted) {
        let tf = bar.candle.timeframe;
        let mut candles = self.cache.recent_bars(&bar.symbol, tf, self.window as isize).await;
        if candles.len() < self.window {
            match self.store.load_candles(&bar.symbol, bar.venue, tf, 0, self.window as i64).await {
                Ok(rows) if rows.len() > candles.len() => candles = rows,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(symbol = %bar.symbol, %tf, error = %err, "store unavailable, computing from in-memory window only");
                }
            }
        }
        if candles.last().map(|c| c.ts_bucket) != Some(bar.candle.ts_bucket) {
            candles.push(bar.candle);
        }

        let mut indicators = marketflow_indicators::compute_indicator_row(&candles);
        indicators.ts_bucket = bar.candle.ts_bucket;
        indicators.timeframe = Some(tf);

        if let Err(err) = self.store.insert_indicators(&bar.symbol, tf, bar.candle.ts_bucket, &indicators).await {
            tracing::warn!(symbol = %bar.symbol, %tf, error = %err, "failed to persist indicator row");
        }
        self.cache.set_indicators(&bar.symbol, tf, &indicators).await;

        let chart_update = ChartUpdate {
            symbol: bar.symbol.clone(),
            venue: bar.venue,
            candle: bar.candle,
            indicators,
        };
        if self.bus_tx.send(BusMessage::ChartUpdate(chart_update.clone())).is_err() {
            tracing::error!("bus channel closed, chart update dropped");
        }

        // Two timeframe workers for the same symbol can reach this concurrently;
        // AlertEngine serializes evaluation per symbol internally.
        self.alerts.handle_chart_update(&chart_update).await;

        let market_open = self.market_open_for(bar.venue);
        let features = marketflow_data::compute_feature_row(&candles, &chart_update.indicators, market_open);
        self.persist_features(&bar.symbol, tf, bar.candle.ts_bucket, &features).await;
    }

    async fn persist_features(&self, symbol: &str, tf: Timeframe, ts_bucket: i64, features: &FeatureRow) {
        let payload = match serde_json::to_value(features) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(%symbol, error = %err, "failed to serialize feature row");
                return;
            }
        };
        if let Err(err) = self.store.insert_ml_features(symbol, tf, ts_bucket, FEATURE_VERSION, &payload).await {
            tracing::warn!(%symbol, %tf, error = %err, "failed to persist feature row");
        }
        self.cache.set_features_latest(symbol, features).await;
    }
}
