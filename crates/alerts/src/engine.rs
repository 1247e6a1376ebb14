//! Per-symbol rule evaluation and dispatch (spec §4.7).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use marketflow_core::clock::Clock;
use marketflow_model::{AlertChannel, AlertFired, AlertRule, ChartUpdate, Condition};
use tokio::sync::Mutex as AsyncMutex;

use crate::channels::{send_with_timeout, NotificationSender};
use crate::rule_store::{AlertRuleStore, RuleCache};

/// Evaluates and dispatches alert rules for a symbol's latest
/// `(price, indicators)` update.
///
/// The indicator orchestrator runs one worker per `(symbol, timeframe)`, so
/// two timeframes for the same symbol can call [`Self::handle_chart_update`]
/// concurrently. `MacdCrossover`'s `prev_macd`/`prev_signal` read-modify-write
/// is not safe under that race (spec §9 requires sequential per-symbol
/// evaluation), so evaluation for a symbol is serialized behind a per-symbol
/// lock — the same "one owner per key" shape as the bar builder and quality
/// checker, applied here via a held lock instead of a dedicated task.
pub struct AlertEngine {
    store: Arc<dyn AlertRuleStore>,
    cache: Arc<dyn RuleCache>,
    clock: Arc<dyn Clock>,
    senders: HashMap<AlertChannel, Arc<dyn NotificationSender>>,
    symbol_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl AlertEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn AlertRuleStore>,
        cache: Arc<dyn RuleCache>,
        clock: Arc<dyn Clock>,
        senders: HashMap<AlertChannel, Arc<dyn NotificationSender>>,
    ) -> Self {
        Self { store, cache, clock, senders, symbol_locks: DashMap::new() }
    }

    /// Loads the active rule set for `update.symbol` (cache, falling back
    /// to the store on a miss, then re-populating the cache) and evaluates
    /// each rule in turn. Holds `update.symbol`'s lock for the duration, so
    /// a second `(symbol, timeframe)` worker for the same symbol blocks
    /// until this update's rule evaluation and metadata writes land.
    pub async fn handle_chart_update(&self, update: &ChartUpdate) {
        let lock = Arc::clone(self.symbol_locks.entry(update.symbol.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).value());
        let _guard = lock.lock().await;

        let rules = self.active_rules(&update.symbol).await;
        for rule in rules {
            self.evaluate_rule(rule, update).await;
        }
    }

    async fn active_rules(&self, symbol: &str) -> Vec<AlertRule> {
        if let Some(cached) = self.cache.get(symbol).await {
            return cached;
        }
        match self.store.active_rules_for_symbol(symbol).await {
            Ok(rules) => {
                self.cache.set(symbol, &rules).await;
                rules
            }
            Err(err) => {
                tracing::warn!(%symbol, error = %err, "alert rule store unavailable, skipping evaluation");
                Vec::new()
            }
        }
    }

    async fn evaluate_rule(&self, mut rule: AlertRule, update: &ChartUpdate) {
        let now_ms = self.clock.now_ms();

        if !rule.is_active {
            return;
        }
        if rule.in_cooldown(now_ms) {
            return;
        }
        if rule.exhausted() {
            return;
        }

        let Evaluation { fired, metadata_changed } = evaluate_condition(&rule, update);
        if metadata_changed {
            if let Err(err) = self.store.save_rule(&rule).await {
                tracing::warn!(rule_id = %rule.id, error = %err, "failed to persist rule metadata");
            }
            self.cache.invalidate(&rule.symbol).await;
        }

        if !fired {
            return;
        }

        let message = describe_fire(&rule, update);
        let event = AlertFired {
            rule_id: rule.id,
            user: rule.user.clone(),
            symbol: rule.symbol.clone(),
            message,
            ts_ms: now_ms,
        };

        dispatch(&self.senders, &rule, &event).await;

        rule.last_fired_at = Some(now_ms);
        rule.fire_count += 1;
        if rule.one_shot {
            rule.is_active = false;
        }
        if let Err(err) = self.store.save_rule(&rule).await {
            tracing::warn!(rule_id = %rule.id, error = %err, "failed to persist fired rule state");
        }
        self.cache.invalidate_alert_rules(&rule.symbol).await;
    }
}

struct Evaluation {
    fired: bool,
    metadata_changed: bool,
}

/// Evaluates `rule.condition` against `update`, mutating `rule.metadata`
/// in place for `MacdCrossover` (spec §4.7 step 4: "Update metadata
/// regardless of fire").
fn evaluate_condition(rule: &mut AlertRule, update: &ChartUpdate) -> Evaluation {
    let price = update.candle.close;
    let indicators = &update.indicators;

    match rule.condition {
        Condition::PriceAbove => Evaluation { fired: price > rule.threshold, metadata_changed: false },
        Condition::PriceBelow => Evaluation { fired: price < rule.threshold, metadata_changed: false },
        Condition::RsiAbove => {
            let fired = indicators.rsi.is_some_and(|rsi| rsi > rule.threshold);
            Evaluation { fired, metadata_changed: false }
        }
        Condition::RsiBelow => {
            let fired = indicators.rsi.is_some_and(|rsi| rsi < rule.threshold);
            Evaluation { fired, metadata_changed: false }
        }
        Condition::VolumeSpike => {
            let fired = indicators.volume_sma.is_some_and(|sma| sma > 0.0 && update.candle.volume > rule.threshold * sma);
            Evaluation { fired, metadata_changed: false }
        }
        Condition::MacdCrossover => {
            let Some(macd) = indicators.macd else {
                return Evaluation { fired: false, metadata_changed: false };
            };
            let prev_macd = rule.metadata.get("prev_macd").copied();
            let prev_signal = rule.metadata.get("prev_signal").copied();

            let fired = match (prev_macd, prev_signal) {
                (Some(prev_macd), Some(prev_signal)) if rule.threshold >= 0.0 => {
                    prev_macd <= prev_signal && macd.line > macd.signal
                }
                (Some(prev_macd), Some(prev_signal)) => prev_macd >= prev_signal && macd.line < macd.signal,
                _ => false,
            };

            rule.metadata.insert("prev_macd".to_string(), macd.line);
            rule.metadata.insert("prev_signal".to_string(), macd.signal);
            Evaluation { fired, metadata_changed: true }
        }
    }
}

fn describe_fire(rule: &AlertRule, update: &ChartUpdate) -> String {
    match rule.condition {
        Condition::PriceAbove => format!("{} above {} (now {})", rule.symbol, rule.threshold, update.candle.close),
        Condition::PriceBelow => format!("{} below {} (now {})", rule.symbol, rule.threshold, update.candle.close),
        Condition::RsiAbove => format!("{} RSI above {}", rule.symbol, rule.threshold),
        Condition::RsiBelow => format!("{} RSI below {}", rule.symbol, rule.threshold),
        Condition::VolumeSpike => format!("{} volume spike (> {}x average)", rule.symbol, rule.threshold),
        Condition::MacdCrossover if rule.threshold >= 0.0 => format!("{} MACD bullish crossover", rule.symbol),
        Condition::MacdCrossover => format!("{} MACD bearish crossover", rule.symbol),
    }
}

/// Dispatches `event` to every channel `rule` subscribes to concurrently;
/// one channel's failure never suppresses the others.
async fn dispatch(senders: &HashMap<AlertChannel, Arc<dyn NotificationSender>>, rule: &AlertRule, event: &AlertFired) {
    let sends = rule.channels.iter().filter_map(|channel| {
        let sender = senders.get(channel)?.clone();
        let event = event.clone();
        Some(async move {
            let channel = sender.channel();
            match send_with_timeout(sender.as_ref(), &event).await {
                Ok(()) => tracing::debug!(?channel, rule_id = %event.rule_id, "alert dispatched"),
                Err(reason) => tracing::warn!(?channel, rule_id = %event.rule_id, %reason, "alert dispatch failed"),
            }
        })
    });
    futures_util::future::join_all(sends).await;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use marketflow_core::clock::TestClock;
    use marketflow_model::{Candle, IndicatorRow, Macd, Timeframe, Venue};
    use uuid::Uuid;

    use super::*;
    use crate::rule_store::{InMemoryAlertRuleStore, NoopRuleCache};

    struct CountingSender {
        channel: AlertChannel,
        hits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NotificationSender for CountingSender {
        fn channel(&self) -> AlertChannel {
            self.channel
        }

        async fn send(&self, _fired: &AlertFired) -> Result<(), String> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn base_rule(condition: Condition, threshold: f64) -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            user: "alice".into(),
            symbol: "BTC-USD".into(),
            condition,
            threshold,
            channels: vec![AlertChannel::Ws],
            cooldown_s: 60,
            one_shot: false,
            is_active: true,
            last_fired_at: None,
            fire_count: 0,
            metadata: HashMap::new(),
        }
    }

    fn chart_update(price: f64) -> ChartUpdate {
        ChartUpdate {
            symbol: "BTC-USD".into(),
            venue: Venue::CryptoStream,
            candle: Candle::seed(0, Timeframe::OneMinute, price, 10.0),
            indicators: IndicatorRow::default(),
        }
    }

    #[tokio::test]
    async fn price_above_fires_and_dispatches_once() {
        let store = Arc::new(InMemoryAlertRuleStore::new());
        let rule = base_rule(Condition::PriceAbove, 100.0);
        store.insert("BTC-USD", rule.clone());

        let hits = Arc::new(AtomicUsize::new(0));
        let mut senders: HashMap<AlertChannel, Arc<dyn NotificationSender>> = HashMap::new();
        senders.insert(AlertChannel::Ws, Arc::new(CountingSender { channel: AlertChannel::Ws, hits: hits.clone() }));

        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let cache = Arc::new(NoopRuleCache);
        let engine = AlertEngine::new(store, cache, clock, senders);

        engine.handle_chart_update(&chart_update(150.0)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cooldown_suppresses_refire() {
        let store = Arc::new(InMemoryAlertRuleStore::new());
        let mut rule = base_rule(Condition::PriceAbove, 100.0);
        rule.last_fired_at = Some(1_700_000_000_000);
        store.insert("BTC-USD", rule);

        let hits = Arc::new(AtomicUsize::new(0));
        let mut senders: HashMap<AlertChannel, Arc<dyn NotificationSender>> = HashMap::new();
        senders.insert(AlertChannel::Ws, Arc::new(CountingSender { channel: AlertChannel::Ws, hits: hits.clone() }));

        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(Utc.timestamp_opt(1_700_000_010, 0).unwrap()));
        let cache = Arc::new(NoopRuleCache);
        let engine = AlertEngine::new(store, cache, clock, senders);

        engine.handle_chart_update(&chart_update(150.0)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn macd_crossover_requires_prior_sample() {
        let store = Arc::new(InMemoryAlertRuleStore::new());
        let rule = base_rule(Condition::MacdCrossover, 1.0);
        store.insert("BTC-USD", rule.clone());

        let hits = Arc::new(AtomicUsize::new(0));
        let mut senders: HashMap<AlertChannel, Arc<dyn NotificationSender>> = HashMap::new();
        senders.insert(AlertChannel::Ws, Arc::new(CountingSender { channel: AlertChannel::Ws, hits: hits.clone() }));

        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let cache = Arc::new(NoopRuleCache);
        let engine = AlertEngine::new(store.clone(), cache, clock, senders);

        let mut update = chart_update(100.0);
        update.indicators.macd = Some(Macd { line: -1.0, signal: 0.5, hist: -1.5 });
        engine.handle_chart_update(&update).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0, "first sample only seeds metadata");

        let stored = store.rule_by_id(rule.id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.get("prev_macd"), Some(&-1.0));

        let mut update2 = chart_update(100.0);
        update2.indicators.macd = Some(Macd { line: 1.0, signal: 0.5, hist: 0.5 });
        engine.handle_chart_update(&update2).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1, "second sample crosses above signal");
    }
}
