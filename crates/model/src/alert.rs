//! Alert rule schema (spec §3, §4.7).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertChannel {
    Ws,
    Email,
    Webhook,
    Slack,
}

/// The condition an [`AlertRule`] evaluates against `(price, indicators)`.
/// Thresholds are carried on the rule itself; `MacdCrossover`'s direction is
/// selected by the sign of `threshold` (positive = bullish, negative =
/// bearish) per spec §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Condition {
    PriceAbove,
    PriceBelow,
    RsiAbove,
    RsiBelow,
    MacdCrossover,
    VolumeSpike,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub user: String,
    pub symbol: String,
    pub condition: Condition,
    pub threshold: f64,
    pub channels: Vec<AlertChannel>,
    pub cooldown_s: u64,
    pub one_shot: bool,
    pub is_active: bool,
    pub last_fired_at: Option<i64>,
    pub fire_count: u64,
    /// Free-form state a rule carries between evaluations. `MacdCrossover`
    /// stores `prev_macd` / `prev_signal` here, updated every evaluation
    /// regardless of whether the rule fires (spec §4.7 step 4).
    #[serde(default)]
    pub metadata: HashMap<String, f64>,
}

impl AlertRule {
    #[must_use]
    pub fn in_cooldown(&self, now_ms: i64) -> bool {
        match self.last_fired_at {
            Some(last) => (now_ms - last) < (self.cooldown_s as i64) * 1000,
            None => false,
        }
    }

    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.one_shot && self.fire_count > 0
    }
}
