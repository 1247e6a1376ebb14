//! Per-symbol tick quality gate (spec §4.3).
//!
//! Each symbol owns its own rolling price/volume history, quality score, and
//! quarantine ring — no state is shared across symbols, so a single
//! [`QualityChecker`] instance can be driven by one task per symbol without
//! locking, the way the bar builder owns its partial candles.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use marketflow_model::{CheckKind, Outcome, QualitySample, Trade, Venue};

const ROLLING_WINDOW: usize = 100;
const MIN_HISTORY: usize = 10;
const MAX_AGE_MS: i64 = 60_000;
const FUTURE_SKEW_MS: i64 = 5_000;
const Z_THRESH: f64 = 3.0;
const PCT_THRESH: f64 = 0.10;
const VOLUME_MULTIPLIER: f64 = 100.0;
const QUARANTINE_CAP: usize = 1000;
const QUALITY_SCORE_ALPHA: f64 = 0.1;
const PASS_SAMPLE_RATE: f64 = 0.01;

/// A bounded rolling window of samples with mean/stdev on demand.
///
/// Eviction of the oldest sample when the window is full means mean and
/// variance can't be retracted incrementally the way true online Welford's
/// algorithm does; at a 100-sample cap recomputing from the window on every
/// push is cheap enough and keeps the numbers exact.
#[derive(Debug, Clone)]
struct RollingStats {
    samples: VecDeque<f64>,
    cap: usize,
}

impl RollingStats {
    fn new(cap: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(cap),
            cap,
        }
    }

    fn push(&mut self, value: f64) {
        if self.samples.len() == self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    fn std_dev(&self) -> f64 {
        let n = self.samples.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let variance =
            self.samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt()
    }

    fn last(&self) -> Option<f64> {
        self.samples.back().copied()
    }
}

/// A quarantined tick: recorded on every check failure (spec §4.3).
#[derive(Debug, Clone)]
pub struct QuarantineEntry {
    pub ts_ms: i64,
    pub symbol: String,
    pub venue: Venue,
    pub check: CheckKind,
    pub reason: String,
    pub quality_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckResult {
    Accepted,
    Rejected { check: CheckKind, reason: String },
}

impl CheckResult {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// The outcome of running a tick through [`QualityChecker::check`].
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub result: CheckResult,
    pub quality_score: f64,
    /// Present when this tick's outcome should be durably persisted: every
    /// failure, plus a deterministic ~1% sample of passes (spec §4.3, §9).
    pub sample: Option<QualitySample>,
}

struct SymbolState {
    prices: RollingStats,
    volumes: RollingStats,
    quality_score: f64,
    quarantine: VecDeque<QuarantineEntry>,
}

impl SymbolState {
    fn new() -> Self {
        Self {
            prices: RollingStats::new(ROLLING_WINDOW),
            volumes: RollingStats::new(ROLLING_WINDOW),
            quality_score: 1.0,
            quarantine: VecDeque::with_capacity(QUARANTINE_CAP),
        }
    }

    fn quarantine(&mut self, entry: QuarantineEntry) {
        if self.quarantine.len() == QUARANTINE_CAP {
            self.quarantine.pop_front();
        }
        self.quarantine.push_back(entry);
    }
}

/// Validates ticks and maintains per-symbol rolling statistics, quality
/// score, and quarantine ring (spec §4.3).
pub struct QualityChecker {
    symbols: HashMap<String, SymbolState>,
    rng: StdRng,
}

impl QualityChecker {
    /// Creates a checker whose pass-sampling is deterministic for the given
    /// seed (spec §9 open question on reproducible sampling).
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            symbols: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Runs `trade` through the ordered check pipeline (spec §4.3 steps
    /// 1–4), updating `symbol`'s rolling history and quality score.
    pub fn check(&mut self, trade: &Trade, now: DateTime<Utc>) -> CheckOutcome {
        let now_ms = now.timestamp_millis();
        let state = self
            .symbols
            .entry(trade.symbol.clone())
            .or_insert_with(SymbolState::new);

        let rejection = Self::evaluate(trade, now_ms, state);

        let outcome_kind = if rejection.is_some() {
            Outcome::Fail
        } else {
            Outcome::Pass
        };
        let target = if outcome_kind == Outcome::Pass { 1.0 } else { 0.0 };
        state.quality_score += QUALITY_SCORE_ALPHA * (target - state.quality_score);
        let quality_score = state.quality_score;

        let result = match &rejection {
            Some((check, reason)) => {
                state.quarantine(QuarantineEntry {
                    ts_ms: trade.ts_ms,
                    symbol: trade.symbol.clone(),
                    venue: trade.venue,
                    check: *check,
                    reason: reason.clone(),
                    quality_score,
                });
                CheckResult::Rejected {
                    check: *check,
                    reason: reason.clone(),
                }
            }
            None => {
                state.prices.push(trade.price);
                state.volumes.push(trade.quantity);
                CheckResult::Accepted
            }
        };

        let should_sample = match &result {
            CheckResult::Rejected { .. } => true,
            CheckResult::Accepted => self.rng.gen_bool(PASS_SAMPLE_RATE),
        };

        let sample = should_sample.then(|| QualitySample {
            ts_ms: trade.ts_ms,
            symbol: trade.symbol.clone(),
            venue: trade.venue,
            check_kind: rejection
                .as_ref()
                .map_or(CheckKind::Finiteness, |(check, _)| *check),
            outcome: outcome_kind,
            reason: rejection.map(|(_, reason)| reason),
            quality_score,
        });

        CheckOutcome {
            result,
            quality_score,
            sample,
        }
    }

    /// Runs the ordered check pipeline without mutating quality score or
    /// quarantine state; `check` applies those side effects.
    fn evaluate(trade: &Trade, now_ms: i64, state: &SymbolState) -> Option<(CheckKind, String)> {
        if !trade.is_well_formed() {
            return Some((
                CheckKind::Finiteness,
                "price or quantity is non-finite or non-positive".to_string(),
            ));
        }

        let age_ms = now_ms - trade.ts_ms;
        if age_ms > MAX_AGE_MS {
            return Some((CheckKind::Freshness, format!("stale: age {age_ms}ms exceeds max_age")));
        }
        if age_ms < -FUTURE_SKEW_MS {
            return Some((
                CheckKind::Freshness,
                format!("timestamp {}ms ahead of now exceeds future-skew allowance", -age_ms),
            ));
        }

        if state.prices.len() >= MIN_HISTORY {
            let mean = state.prices.mean();
            let std_dev = state.prices.std_dev();
            if std_dev > 0.0 {
                let z = (trade.price - mean) / std_dev;
                if z.abs() > Z_THRESH {
                    return Some((
                        CheckKind::PriceAnomaly,
                        format!("z-score {z:.2} exceeds threshold {Z_THRESH}"),
                    ));
                }
            }
            if let Some(last) = state.prices.last() {
                let pct_change = (trade.price - last).abs() / last;
                if pct_change > PCT_THRESH {
                    return Some((
                        CheckKind::PriceAnomaly,
                        format!("pct-change {pct_change:.4} exceeds threshold {PCT_THRESH}"),
                    ));
                }
            }
        }

        if state.volumes.len() >= MIN_HISTORY {
            let mean_volume = state.volumes.mean();
            if trade.quantity > VOLUME_MULTIPLIER * mean_volume {
                return Some((
                    CheckKind::VolumeSanity,
                    format!(
                        "quantity {} exceeds {VOLUME_MULTIPLIER}x mean volume {mean_volume:.4}",
                        trade.quantity
                    ),
                ));
            }
        }

        None
    }

    /// The current EMA quality score for `symbol`, if any ticks have been
    /// seen for it.
    #[must_use]
    pub fn quality_score(&self, symbol: &str) -> Option<f64> {
        self.symbols.get(symbol).map(|s| s.quality_score)
    }

    /// Recent quarantined ticks for `symbol`, oldest first, for
    /// `/quality/{symbol}` (SPEC_FULL §C).
    #[must_use]
    pub fn recent_quarantine(&self, symbol: &str) -> &[QuarantineEntry] {
        self.symbols
            .get(symbol)
            .map_or(&[], |s| s.quarantine.as_slices().0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn trade_at(symbol: &str, price: f64, ts_ms: i64) -> Trade {
        Trade {
            venue: Venue::CryptoStream,
            symbol: symbol.to_string(),
            price,
            quantity: 1.0,
            ts_ms,
            side_hint: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[rstest]
    #[case(-1.0, 1.0)]
    #[case(f64::NAN, 1.0)]
    #[case(f64::INFINITY, 1.0)]
    #[case(100.0, -1.0)]
    fn rejects_malformed_trade(#[case] price: f64, #[case] quantity: f64) {
        let mut checker = QualityChecker::new(0);
        let trade = Trade {
            venue: Venue::CryptoStream,
            symbol: "BTC".to_string(),
            price,
            quantity,
            ts_ms: now().timestamp_millis(),
            side_hint: None,
        };
        let outcome = checker.check(&trade, now());
        assert_eq!(
            outcome.result,
            CheckResult::Rejected {
                check: CheckKind::Finiteness,
                reason: "price or quantity is non-finite or non-positive".to_string(),
            }
        );
    }

    #[test]
    fn rejects_stale_tick() {
        let mut checker = QualityChecker::new(0);
        let stale_ts = now().timestamp_millis() - 120_000;
        let trade = trade_at("BTC", 100.0, stale_ts);
        let outcome = checker.check(&trade, now());
        assert_eq!(
            outcome.result,
            CheckResult::Rejected {
                check: CheckKind::Freshness,
                reason: "stale: age 120000ms exceeds max_age".to_string(),
            }
        );
    }

    #[test]
    fn accepts_future_tick_within_skew_allowance() {
        let mut checker = QualityChecker::new(0);
        let near_future = now().timestamp_millis() + 2_000;
        let trade = trade_at("BTC", 100.0, near_future);
        assert!(checker.check(&trade, now()).result.is_accepted());
    }

    #[test]
    fn price_anomaly_rejected_after_ten_samples_then_recovers() {
        let mut checker = QualityChecker::new(42);
        let t = now();
        for i in 0..20 {
            let price = 100.0 + (i % 2) as f64 * 0.1;
            let trade = trade_at("X", price, t.timestamp_millis());
            assert!(checker.check(&trade, t).result.is_accepted());
        }
        let score_before = checker.quality_score("X").unwrap();

        let spike = trade_at("X", 150.0, t.timestamp_millis());
        let outcome = checker.check(&spike, t);
        assert!(!outcome.result.is_accepted());
        assert!(checker.quality_score("X").unwrap() < score_before);

        let normal = trade_at("X", 100.0, t.timestamp_millis());
        assert!(checker.check(&normal, t).result.is_accepted());
    }

    #[test]
    fn volume_sanity_requires_ten_prior_volumes() {
        let mut checker = QualityChecker::new(0);
        let t = now();
        let mut state_trade = Trade {
            venue: Venue::CryptoStream,
            symbol: "Y".to_string(),
            price: 100.0,
            quantity: 10.0,
            ts_ms: t.timestamp_millis(),
            side_hint: None,
        };
        for _ in 0..10 {
            assert!(checker.check(&state_trade, t).result.is_accepted());
        }
        state_trade.quantity = 10_000.0;
        assert!(!checker.check(&state_trade, t).result.is_accepted());
    }

    #[test]
    fn quality_score_stays_in_unit_interval_under_replay() {
        let mut checker = QualityChecker::new(7);
        let t = now();
        for i in 0..50 {
            let price = if i == 25 { 9999.0 } else { 100.0 };
            let trade = trade_at("Z", price, t.timestamp_millis());
            let outcome = checker.check(&trade, t);
            assert!((0.0..=1.0).contains(&outcome.quality_score));
        }
    }

    #[test]
    fn quarantine_ring_is_bounded() {
        let mut checker = QualityChecker::new(0);
        let t = now();
        for _ in 0..1500 {
            let trade = trade_at("Q", f64::NAN, t.timestamp_millis());
            checker.check(&trade, t);
        }
        assert_eq!(checker.recent_quarantine("Q").len(), QUARANTINE_CAP);
    }
}
