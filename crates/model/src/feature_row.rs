//! ML feature row schema (spec §3, §4.6). Flattened, fixed-schema, one row
//! per `(ts_bucket, symbol, timeframe, feature_version)`.

use serde::{Deserialize, Serialize};

use crate::timeframe::Timeframe;

/// Forward-compatible schema version tag for [`FeatureRow`].
pub const FEATURE_VERSION: &str = "v1.0";

/// A flattened, ML-ready feature vector derived from a bar + indicator
/// history window. NaNs are back-filled, then forward-filled, then zeroed
/// by the feature engineer before this row is produced — every field here
/// is always a finite `f64` or an explicit flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub ts_bucket: i64,
    #[serde(skip)]
    pub timeframe: Option<Timeframe>,
    pub feature_version: &'static str,

    // --- returns / momentum ---
    pub return_1: f64,
    pub return_5: f64,
    pub return_10: f64,
    pub log_return_1: f64,
    pub momentum_5: f64,
    pub momentum_10: f64,
    pub acceleration: f64,

    // --- volatility ---
    pub stdev_5: f64,
    pub stdev_10: f64,
    pub stdev_20: f64,
    pub high_low_ratio: f64,
    pub true_range: f64,
    pub volatility_trend: f64,

    // --- volume ---
    pub volume_change: f64,
    pub volume_momentum: f64,
    pub volume_momentum_10: f64,
    pub volume_ratio: f64,
    pub volume_ratio_5: f64,
    pub cum_volume_price_trend: f64,
    pub volume_price_trend_norm: f64,

    // --- technical-derived ---
    pub rsi_oversold: f64,
    pub rsi_neutral: f64,
    pub rsi_overbought: f64,
    pub macd_cross_up: f64,
    pub macd_cross_down: f64,
    pub bollinger_position: f64,
    pub bollinger_width: f64,
    pub bollinger_squeeze: f64,

    // --- calendar ---
    pub hour_of_day: f64,
    pub day_of_week: f64,
    pub is_weekend: f64,
    pub is_market_open: f64,

    // --- trend ---
    pub sma20_distance: f64,
    pub sma50_distance: f64,
    pub sma100_distance: f64,
    pub sma200_distance: f64,
    pub price_above_sma20: f64,
    pub price_above_sma50: f64,
    pub price_above_sma100: f64,
    pub price_above_sma200: f64,
    pub trend_strength: f64,
}

impl Default for FeatureRow {
    fn default() -> Self {
        Self {
            ts_bucket: 0,
            timeframe: None,
            feature_version: FEATURE_VERSION,
            return_1: 0.0,
            return_5: 0.0,
            return_10: 0.0,
            log_return_1: 0.0,
            momentum_5: 0.0,
            momentum_10: 0.0,
            acceleration: 0.0,
            stdev_5: 0.0,
            stdev_10: 0.0,
            stdev_20: 0.0,
            high_low_ratio: 0.0,
            true_range: 0.0,
            volatility_trend: 0.0,
            volume_change: 0.0,
            volume_momentum: 0.0,
            volume_momentum_10: 0.0,
            volume_ratio: 0.0,
            volume_ratio_5: 0.0,
            cum_volume_price_trend: 0.0,
            volume_price_trend_norm: 0.0,
            rsi_oversold: 0.0,
            rsi_neutral: 0.0,
            rsi_overbought: 0.0,
            macd_cross_up: 0.0,
            macd_cross_down: 0.0,
            bollinger_position: 0.0,
            bollinger_width: 0.0,
            bollinger_squeeze: 0.0,
            hour_of_day: 0.0,
            day_of_week: 0.0,
            is_weekend: 0.0,
            is_market_open: 0.0,
            sma20_distance: 0.0,
            sma50_distance: 0.0,
            sma100_distance: 0.0,
            sma200_distance: 0.0,
            price_above_sma20: 0.0,
            price_above_sma50: 0.0,
            price_above_sma100: 0.0,
            price_above_sma200: 0.0,
            trend_strength: 0.0,
        }
    }
}
