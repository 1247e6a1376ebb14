//! Sparse indicator row schema (spec §3, §4.5). `None` means "insufficient
//! history" for that series.

use serde::{Deserialize, Serialize};

use crate::timeframe::Timeframe;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub hist: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stochastic {
    pub k: f64,
    pub d: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sma {
    pub s20: Option<f64>,
    pub s50: Option<f64>,
    pub s100: Option<f64>,
    pub s200: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ema {
    pub e12: Option<f64>,
    pub e26: Option<f64>,
    pub e50: Option<f64>,
}

/// A single `(ts_bucket, symbol, timeframe)` keyed row of the fixed
/// indicator set. Every field is `None` until the underlying window has
/// accumulated enough history for that indicator's period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub ts_bucket: i64,
    #[serde(skip)]
    pub timeframe: Option<Timeframe>,
    pub rsi: Option<f64>,
    pub macd: Option<Macd>,
    pub bollinger: Option<Bollinger>,
    pub sma: Sma,
    pub ema: Ema,
    pub vwap: Option<f64>,
    pub stochastic: Option<Stochastic>,
    pub atr: Option<f64>,
    pub adx: Option<f64>,
    pub volume_sma: Option<f64>,
}
