//! Typed bus message schemas (spec §9 "dynamic typing of payloads" redesign
//! flag). Internal paths never pass a "dict of any"; the boundary parsers
//! (collectors, the Redis transport) own the conversion into these types.

use serde::{Deserialize, Serialize};

use crate::{candle::Candle, indicator_row::IndicatorRow, symbol::Venue, trade::Trade};

/// A message published on `trades:<venue>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMessage {
    pub symbol: String,
    pub trade: Trade,
}

/// A message published on `bars:completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarCompleted {
    pub symbol: String,
    pub venue: Venue,
    pub candle: Candle,
}

/// A message published on `chart_updates`: a completed bar combined with
/// its freshly recomputed indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartUpdate {
    pub symbol: String,
    pub venue: Venue,
    pub candle: Candle,
    pub indicators: IndicatorRow,
}

/// A component's self-reported operational status, published on
/// `system:health` keyed by component name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub component: String,
    pub running: bool,
    pub connected: bool,
    pub trades_received: u64,
    pub errors: u64,
    pub reconnects: u64,
    pub cb_state: String,
    pub uptime_secs: u64,
}

/// A notification fanned out to a user's alert channels on
/// `alerts:<user_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertFired {
    pub rule_id: uuid::Uuid,
    pub user: String,
    pub symbol: String,
    pub message: String,
    pub ts_ms: i64,
}

/// The tagged union of everything that can flow over the in-process bus.
/// Named bus channels (`trades:<venue>`, `bars:completed`, `chart_updates`,
/// `alerts:<user>`, `system:health`) each carry exactly one variant; the
/// dispatcher task for a channel only ever constructs/matches on that
/// variant, but a single enum keeps the Redis transport (which serializes
/// whatever comes off the channel) and tests simple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMessage {
    Trade(TradeMessage),
    BarCompleted(BarCompleted),
    ChartUpdate(ChartUpdate),
    Health(HealthReport),
    Alert(AlertFired),
}

impl BusMessage {
    /// The bus channel name this message belongs on.
    #[must_use]
    pub fn channel(&self) -> String {
        match self {
            Self::Trade(t) => format!("trades:{}", t.trade.venue),
            Self::BarCompleted(_) => "bars:completed".to_string(),
            Self::ChartUpdate(_) => "chart_updates".to_string(),
            Self::Health(_) => "system:health".to_string(),
            Self::Alert(a) => format!("alerts:{}", a.user),
        }
    }
}
