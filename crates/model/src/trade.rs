//! The transient trade/tick schema. Never persisted in the core path.

use serde::{Deserialize, Serialize};

use crate::symbol::Venue;

/// An executed match report from a venue, normalized to a common schema
/// before it reaches the Quality Checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub venue: Venue,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    /// Milliseconds since the Unix epoch.
    pub ts_ms: i64,
    pub side_hint: Option<Side>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Trade {
    /// Basic well-formedness: finite, positive price, finite non-negative
    /// quantity. Does not perform the statistical checks the Quality
    /// Checker owns — this only guards against NaN/infinite/non-positive
    /// values reaching any rolling-history computation.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.price.is_finite()
            && self.price > 0.0
            && self.quantity.is_finite()
            && self.quantity >= 0.0
    }
}
