//! Symbol catalog entries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Asset class a [`Symbol`] trades in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Crypto,
    UsEquity,
}

/// The venue a [`Symbol`] is sourced from. Matches the collector variant
/// that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    /// High-rate streaming crypto exchange.
    CryptoStream,
    /// Delayed US-equity REST endpoint, polled during market hours.
    EquityPolled,
    /// End-of-day equity endpoint, polled under a strict rate budget.
    EquityEod,
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Crypto => "crypto",
            Self::UsEquity => "us_equity",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CryptoStream => "crypto_stream",
            Self::EquityPolled => "equity_polled",
            Self::EquityEod => "equity_eod",
        };
        write!(f, "{s}")
    }
}

/// The unique `(asset_class, symbol, venue)` triple identifying a tradable
/// instrument. Owned by the catalog; collectors only read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub asset_class: AssetClass,
    pub symbol: String,
    pub venue: Venue,
    pub display_name: String,
    pub is_active: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Symbol {
    /// The catalog key used everywhere else (bus channel suffixes, cache
    /// keys, storage natural key).
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.venue, self.symbol)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
