//! Converts accepted ticks into base-timeframe candles and rolls them up
//! into higher timeframes (spec §4.4), grounded on the teacher's
//! `BarAggregator`/`BarBuilder` split: one owner per `(symbol, venue,
//! timeframe)`, updated in place, closed and reseeded on bucket change.

use std::collections::{HashMap, VecDeque};

use marketflow_core::time::bucket_start_ms;
use marketflow_model::{Candle, OhlcViolation, Timeframe, Trade, Venue};

const RING_CAPACITY: usize = 1000;

type BarKey = (String, Venue, Timeframe);

/// A candle that just closed, carrying enough context to drive the
/// completion side effects spec §4.4 requires, in order: persist, publish,
/// ring-append.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub symbol: String,
    pub venue: Venue,
    pub candle: Candle,
    /// Set when the closed candle failed its OHLC invariants. Spec §7:
    /// persisted and emitted anyway, never dropped.
    pub violation: Option<OhlcViolation>,
}

enum Decision {
    SeedFresh,
    Extend,
    CloseAndReseed,
    DropOutOfOrder,
}

/// Builds and rolls up OHLCV candles. Holds at most one open candle per
/// `(symbol, venue, timeframe)` plus a bounded ring (cap 1000) of completed
/// ones that the indicator engine replays.
#[derive(Debug, Default)]
pub struct BarBuilder {
    open: HashMap<BarKey, Candle>,
    rings: HashMap<BarKey, VecDeque<Candle>>,
    last_update_ms: HashMap<BarKey, i64>,
}

impl BarBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one accepted tick. Returns every candle that closed as a
    /// result: the base candle first (if any), then its roll-ups, in
    /// ascending timeframe order.
    pub fn on_trade(&mut self, trade: &Trade) -> Vec<Completion> {
        let base = Timeframe::base();
        let bucket = bucket_start_ms(trade.ts_ms, base.period_ms());
        let key: BarKey = (trade.symbol.clone(), trade.venue, base);

        let mut completions = Vec::new();

        let decision = match self.open.get(&key) {
            None => Decision::SeedFresh,
            Some(candle) if bucket < candle.ts_bucket => Decision::DropOutOfOrder,
            Some(candle) if candle.ts_bucket == bucket => Decision::Extend,
            Some(_) => Decision::CloseAndReseed,
        };

        match decision {
            Decision::DropOutOfOrder => return completions,
            Decision::Extend => {
                let candle = self.open.get_mut(&key).expect("checked above");
                candle.update(trade.price, trade.quantity);
            }
            Decision::SeedFresh => {
                self.open
                    .insert(key.clone(), Candle::seed(bucket, base, trade.price, trade.quantity));
            }
            Decision::CloseAndReseed => {
                let previous = self.open.remove(&key).expect("checked above");
                let completion = self.finish(key.0.clone(), key.1, previous);
                completions.push(completion.clone());
                self.roll_up(&completion, &mut completions);
                self.open
                    .insert(key.clone(), Candle::seed(bucket, base, trade.price, trade.quantity));
            }
        }

        self.last_update_ms.insert(key, trade.ts_ms);
        completions
    }

    /// Rolls a just-closed base candle into every higher-timeframe target
    /// (spec §4.4's roll-up rules), appending any further completions.
    fn roll_up(&mut self, base: &Completion, completions: &mut Vec<Completion>) {
        for timeframe in Timeframe::rollup_targets() {
            let bucket = bucket_start_ms(base.candle.ts_bucket, timeframe.period_ms());
            let key: BarKey = (base.symbol.clone(), base.venue, timeframe);

            let same_bucket = self.open.get(&key).map(|candle| candle.ts_bucket == bucket);

            match same_bucket {
                Some(true) => {
                    let candle = self.open.get_mut(&key).expect("checked above");
                    candle.high = candle.high.max(base.candle.high);
                    candle.low = candle.low.min(base.candle.low);
                    candle.close = base.candle.close;
                    candle.volume += base.candle.volume;
                    candle.trade_count += base.candle.trade_count;
                }
                Some(false) => {
                    let previous = self.open.remove(&key).expect("checked above");
                    let completion = self.finish(key.0.clone(), key.1, previous);
                    completions.push(completion);
                    self.open
                        .insert(key.clone(), Self::seed_from_base(timeframe, bucket, &base.candle));
                }
                None => {
                    self.open
                        .insert(key.clone(), Self::seed_from_base(timeframe, bucket, &base.candle));
                }
            }

            self.last_update_ms.insert(key, base.candle.ts_bucket);
        }
    }

    fn seed_from_base(timeframe: Timeframe, bucket: i64, base: &Candle) -> Candle {
        Candle {
            ts_bucket: bucket,
            timeframe,
            open: base.open,
            high: base.high,
            low: base.low,
            close: base.close,
            volume: base.volume,
            trade_count: base.trade_count,
            completed: false,
        }
    }

    fn finish(&mut self, symbol: String, venue: Venue, mut candle: Candle) -> Completion {
        let violation = candle.validate();
        candle.completed = true;

        let key: BarKey = (symbol.clone(), venue, candle.timeframe);
        let ring = self.rings.entry(key).or_insert_with(|| VecDeque::with_capacity(RING_CAPACITY));
        if ring.len() == RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(candle);

        Completion {
            symbol,
            venue,
            candle,
            violation,
        }
    }

    /// Force-closes any open candle idle for at least `max_idle_ms`,
    /// without waiting for the next bucket's first tick. Not called by the
    /// core path; an optional [`crate::idle_flusher::IdleFlusher`] task
    /// drives it when enabled (spec §4.4 edge cases, §9 open question).
    pub fn force_close_idle(&mut self, now_ms: i64, max_idle_ms: i64) -> Vec<Completion> {
        let stale: Vec<BarKey> = self
            .last_update_ms
            .iter()
            .filter(|(_, &last)| now_ms - last >= max_idle_ms)
            .map(|(key, _)| key.clone())
            .collect();

        let mut completions = Vec::with_capacity(stale.len());
        for key in stale {
            self.last_update_ms.remove(&key);
            if let Some(candle) = self.open.remove(&key) {
                completions.push(self.finish(key.0, key.1, candle));
            }
        }
        completions
    }

    /// A snapshot of the last N completed candles for `(symbol, venue,
    /// timeframe)`, oldest first — the window the indicator engine replays.
    #[must_use]
    pub fn ring(&self, symbol: &str, venue: Venue, timeframe: Timeframe) -> Vec<Candle> {
        self.rings
            .get(&(symbol.to_string(), venue, timeframe))
            .map(|ring| ring.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The still-open (not yet completed) candle for `(symbol, venue,
    /// timeframe)`, if any. Backs the `current_bar:{symbol}:{tf}` cache key
    /// (spec §6).
    #[must_use]
    pub fn current(&self, symbol: &str, venue: Venue, timeframe: Timeframe) -> Option<Candle> {
        self.open.get(&(symbol.to_string(), venue, timeframe)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(symbol: &str, price: f64, qty: f64, ts_ms: i64) -> Trade {
        Trade {
            venue: Venue::CryptoStream,
            symbol: symbol.to_string(),
            price,
            quantity: qty,
            ts_ms,
            side_hint: None,
        }
    }

    /// Scenario 1 from spec §8: bar closure on boundary.
    #[test]
    fn closes_base_candle_on_bucket_boundary() {
        let mut builder = BarBuilder::new();
        let ticks = [
            (60_000, 100.0, 1.0),
            (60_100, 101.0, 1.0),
            (60_400, 99.0, 1.0),
            (60_900, 102.0, 1.0),
        ];
        for (ts, price, qty) in ticks {
            assert!(builder.on_trade(&trade("BTC", price, qty, ts)).is_empty());
        }

        let completions = builder.on_trade(&trade("BTC", 103.0, 1.0, 120_000));
        let base_completion = completions
            .iter()
            .find(|c| c.candle.timeframe == Timeframe::OneMinute)
            .expect("base candle should have closed");

        assert_eq!(base_completion.candle.ts_bucket, 60_000);
        assert_eq!(base_completion.candle.open, 100.0);
        assert_eq!(base_completion.candle.high, 102.0);
        assert_eq!(base_completion.candle.low, 99.0);
        assert_eq!(base_completion.candle.close, 102.0);
        assert_eq!(base_completion.candle.volume, 4.0);
        assert_eq!(base_completion.candle.trade_count, 4);
    }

    /// Scenario 2 from spec §8: 5m roll-up from five consecutive 1m candles.
    #[test]
    fn rolls_five_one_minute_candles_into_a_five_minute_candle() {
        let mut builder = BarBuilder::new();
        let bars = [
            (10.0, 12.0, 9.0, 11.0, 1.0),
            (11.0, 13.0, 10.0, 12.0, 2.0),
            (12.0, 14.0, 11.0, 13.0, 3.0),
            (13.0, 15.0, 12.0, 14.0, 4.0),
            (14.0, 16.0, 13.0, 15.0, 5.0),
        ];

        // Drive each 1m bucket with two ticks (open then close price) so the
        // base candle closes deterministically on the next bucket's tick.
        for (i, (o, h, l, c, v)) in bars.iter().enumerate() {
            let base_ts = i as i64 * 60_000;
            builder.on_trade(&trade("ETH", *o, 0.0, base_ts));
            builder.on_trade(&trade("ETH", *h, v / 2.0, base_ts + 10_000));
            builder.on_trade(&trade("ETH", *l, 0.0, base_ts + 20_000));
            builder.on_trade(&trade("ETH", *c, v / 2.0, base_ts + 30_000));
        }
        // Closes the last (240s) base bucket and rolls it into the open 5m candle.
        builder.on_trade(&trade("ETH", 20.0, 1.0, 300_000));

        let five_min = builder
            .current("ETH", Venue::CryptoStream, Timeframe::FiveMinutes)
            .expect("5m candle should still be open, holding all five rolled-up bars");

        assert_eq!(five_min.ts_bucket, 0);
        assert_eq!(five_min.open, 10.0);
        assert_eq!(five_min.high, 16.0);
        assert_eq!(five_min.low, 9.0);
        assert_eq!(five_min.close, 15.0);
        assert_eq!(five_min.volume, 15.0);
    }

    #[test]
    fn drops_out_of_order_tick_behind_current_bucket() {
        let mut builder = BarBuilder::new();
        builder.on_trade(&trade("BTC", 100.0, 1.0, 120_000));
        let completions = builder.on_trade(&trade("BTC", 50.0, 1.0, 60_000));
        assert!(completions.is_empty());
    }

    #[test]
    fn zero_tick_bucket_is_never_materialised() {
        let mut builder = BarBuilder::new();
        builder.on_trade(&trade("BTC", 100.0, 1.0, 0));
        // Next tick lands two buckets later; bucket 60_000 never existed.
        let completions = builder.on_trade(&trade("BTC", 101.0, 1.0, 120_000));
        let closed = completions
            .iter()
            .find(|c| c.candle.timeframe == Timeframe::OneMinute)
            .unwrap();
        assert_eq!(closed.candle.ts_bucket, 0);
        assert!(builder.ring("BTC", Venue::CryptoStream, Timeframe::OneMinute).len() == 1);
    }

    #[test]
    fn idle_flusher_force_closes_a_stale_open_candle() {
        let mut builder = BarBuilder::new();
        builder.on_trade(&trade("BTC", 100.0, 1.0, 0));
        let completions = builder.force_close_idle(600_000, 300_000);
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].candle.ts_bucket, 0);
        assert!(builder.force_close_idle(900_000, 300_000).is_empty());
    }
}
