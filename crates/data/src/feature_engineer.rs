//! Derives the ~60-field ML feature row from a bar window plus its latest
//! indicator row (spec §4.6).
//!
//! The windowed indicator engine (`marketflow_indicators::windowed`) only
//! ever produces the *latest* row for a window, not a per-bar series, so
//! there is no adjacent history within a single call to back-fill or
//! forward-fill from. At that granularity spec §4.6's "back-fill, then
//! forward-fill, then zero" NaN policy collapses to its last step: missing
//! values become `0.0`. [`fill`] documents that explicitly at the one place
//! it happens.

use chrono::{DateTime, Datelike, Timelike, Utc};

use marketflow_model::{Candle, FeatureRow, IndicatorRow, FEATURE_VERSION};

const BOLLINGER_SQUEEZE_WIDTH: f64 = 0.05;

/// Collapses a possibly-missing feature value to `0.0` (spec §4.6 NaN policy,
/// see module docs).
fn fill(value: Option<f64>) -> f64 {
    value.unwrap_or(0.0)
}

fn close_n_back(candles: &[Candle], n: usize) -> Option<f64> {
    let len = candles.len();
    if len <= n {
        return None;
    }
    Some(candles[len - 1 - n].close)
}

fn pct_return(candles: &[Candle], n: usize) -> Option<f64> {
    let last = candles.last()?.close;
    let prior = close_n_back(candles, n)?;
    if prior == 0.0 {
        return None;
    }
    Some((last - prior) / prior)
}

fn stdev_last_n(candles: &[Candle], n: usize) -> Option<f64> {
    if candles.len() < n {
        return None;
    }
    let window = &candles[candles.len() - n..];
    let mean = window.iter().map(|c| c.close).sum::<f64>() / n as f64;
    let variance = window.iter().map(|c| (c.close - mean).powi(2)).sum::<f64>() / n as f64;
    Some(variance.sqrt())
}

fn mean_volume_last_n(candles: &[Candle], n: usize) -> Option<f64> {
    if candles.len() < n {
        return None;
    }
    let window = &candles[candles.len() - n..];
    Some(window.iter().map(|c| c.volume).sum::<f64>() / n as f64)
}

fn true_range(candles: &[Candle]) -> Option<f64> {
    let len = candles.len();
    let last = candles.get(len.checked_sub(1)?)?;
    if len < 2 {
        return Some(last.high - last.low);
    }
    let prev_close = candles[len - 2].close;
    Some(
        (last.high - last.low)
            .max((last.high - prev_close).abs())
            .max((last.low - prev_close).abs()),
    )
}

fn cumulative_volume_price_trend(candles: &[Candle]) -> Option<f64> {
    if candles.len() < 2 {
        return None;
    }
    let mut cum = 0.0;
    for pair in candles.windows(2) {
        let sign = (pair[1].close - pair[0].close).signum();
        cum += sign * pair[1].volume;
    }
    Some(cum)
}

/// `cum_volume_price_trend` scaled by the total volume it was accumulated
/// over, so the feature is bounded to roughly `[-1, 1]` instead of growing
/// with the window length.
fn normalized_volume_price_trend(candles: &[Candle]) -> Option<f64> {
    let cum = cumulative_volume_price_trend(candles)?;
    let total_volume: f64 = candles[1..].iter().map(|c| c.volume).sum();
    if total_volume == 0.0 {
        return None;
    }
    Some(cum / total_volume)
}

/// Produces the latest [`FeatureRow`] for `candles` (oldest first, the same
/// window handed to the indicator engine) and its freshly computed
/// `indicators`. `market_open` is supplied by the caller (the venue's market
/// calendar, not something this crate tracks).
#[must_use]
pub fn compute_feature_row(
    candles: &[Candle],
    indicators: &IndicatorRow,
    market_open: bool,
) -> FeatureRow {
    let Some(last) = candles.last() else {
        return FeatureRow::default();
    };

    let return_1 = pct_return(candles, 1);
    let return_5 = pct_return(candles, 5);
    let return_10 = pct_return(candles, 10);
    let log_return_1 = close_n_back(candles, 1).map(|prior| (last.close / prior).ln());

    let momentum_5 = close_n_back(candles, 5).and_then(|c| if c != 0.0 { Some((last.close - c) / c) } else { None });
    let momentum_10 = close_n_back(candles, 10).and_then(|c| if c != 0.0 { Some((last.close - c) / c) } else { None });
    let acceleration = (|| {
        let r1 = pct_return(&candles[..candles.len() - 1], 1)?;
        let r0 = pct_return(candles, 1)?;
        Some(r0 - r1)
    })();

    let stdev_5 = stdev_last_n(candles, 5);
    let stdev_10 = stdev_last_n(candles, 10);
    let stdev_20 = stdev_last_n(candles, 20);
    let high_low_ratio = if last.close != 0.0 { Some((last.high - last.low) / last.close) } else { None };
    let tr = true_range(candles);
    let volatility_trend = match (stdev_5, stdev_20) {
        (Some(s5), Some(s20)) if s20 != 0.0 => Some(s5 / s20),
        _ => None,
    };

    let volume_change = {
        let len = candles.len();
        (len >= 2).then(|| candles[len - 2].volume).and_then(|prior| {
            if prior == 0.0 {
                None
            } else {
                Some((last.volume - prior) / prior)
            }
        })
    };
    let volume_momentum = {
        let len = candles.len();
        (len > 5).then(|| candles[len - 6].volume).and_then(|prior| {
            if prior == 0.0 {
                None
            } else {
                Some((last.volume - prior) / prior)
            }
        })
    };
    let volume_momentum_10 = {
        let len = candles.len();
        (len > 10).then(|| candles[len - 11].volume).and_then(|prior| {
            if prior == 0.0 {
                None
            } else {
                Some((last.volume - prior) / prior)
            }
        })
    };
    let volume_ratio = mean_volume_last_n(candles, 20).and_then(|mean| {
        if mean == 0.0 {
            None
        } else {
            Some(last.volume / mean)
        }
    });
    let volume_ratio_5 = mean_volume_last_n(candles, 5).and_then(|mean| {
        if mean == 0.0 {
            None
        } else {
            Some(last.volume / mean)
        }
    });
    let cum_volume_price_trend = cumulative_volume_price_trend(candles);
    let volume_price_trend_norm = normalized_volume_price_trend(candles);

    let rsi_zone = indicators.rsi.map(|rsi| {
        if rsi < 30.0 {
            (1.0, 0.0, 0.0)
        } else if rsi > 70.0 {
            (0.0, 0.0, 1.0)
        } else {
            (0.0, 1.0, 0.0)
        }
    });
    let (rsi_oversold, rsi_neutral, rsi_overbought) = rsi_zone.unwrap_or((0.0, 0.0, 0.0));

    let (macd_cross_up, macd_cross_down) = indicators
        .macd
        .map(|macd| {
            if macd.line > macd.signal {
                (1.0, 0.0)
            } else {
                (0.0, 1.0)
            }
        })
        .unwrap_or((0.0, 0.0));

    let (bollinger_position, bollinger_width, bollinger_squeeze) = indicators
        .bollinger
        .map(|bb| {
            let range = bb.upper - bb.lower;
            let position = if range != 0.0 { (last.close - bb.lower) / range } else { 0.5 };
            let width = if bb.middle != 0.0 { range / bb.middle } else { 0.0 };
            let squeeze = if width < BOLLINGER_SQUEEZE_WIDTH { 1.0 } else { 0.0 };
            (position, width, squeeze)
        })
        .unwrap_or((0.0, 0.0, 0.0));

    let dt: DateTime<Utc> =
        DateTime::from_timestamp_millis(last.ts_bucket).unwrap_or_else(Utc::now);
    let hour_of_day = f64::from(dt.hour());
    let day_of_week = f64::from(dt.weekday().num_days_from_monday());
    let is_weekend = if day_of_week >= 5.0 { 1.0 } else { 0.0 };

    let sma = indicators.sma;
    let sma20_distance = sma.s20.and_then(|s| (s != 0.0).then(|| (last.close - s) / s));
    let sma50_distance = sma.s50.and_then(|s| (s != 0.0).then(|| (last.close - s) / s));
    let sma100_distance = sma.s100.and_then(|s| (s != 0.0).then(|| (last.close - s) / s));
    let sma200_distance = sma.s200.and_then(|s| (s != 0.0).then(|| (last.close - s) / s));
    let price_above_sma20 = sma.s20.map(|s| if last.close > s { 1.0 } else { 0.0 });
    let price_above_sma50 = sma.s50.map(|s| if last.close > s { 1.0 } else { 0.0 });
    let price_above_sma100 = sma.s100.map(|s| if last.close > s { 1.0 } else { 0.0 });
    let price_above_sma200 = sma.s200.map(|s| if last.close > s { 1.0 } else { 0.0 });
    let trend_strength = match (sma.s20, sma.s50) {
        (Some(s20), Some(s50)) if s50 != 0.0 => Some((s20 - s50) / s50),
        _ => None,
    };

    FeatureRow {
        ts_bucket: last.ts_bucket,
        timeframe: Some(last.timeframe),
        feature_version: FEATURE_VERSION,
        return_1: fill(return_1),
        return_5: fill(return_5),
        return_10: fill(return_10),
        log_return_1: fill(log_return_1),
        momentum_5: fill(momentum_5),
        momentum_10: fill(momentum_10),
        acceleration: fill(acceleration),
        stdev_5: fill(stdev_5),
        stdev_10: fill(stdev_10),
        stdev_20: fill(stdev_20),
        high_low_ratio: fill(high_low_ratio),
        true_range: fill(tr),
        volatility_trend: fill(volatility_trend),
        volume_change: fill(volume_change),
        volume_momentum: fill(volume_momentum),
        volume_momentum_10: fill(volume_momentum_10),
        volume_ratio: fill(volume_ratio),
        volume_ratio_5: fill(volume_ratio_5),
        cum_volume_price_trend: fill(cum_volume_price_trend),
        volume_price_trend_norm: fill(volume_price_trend_norm),
        rsi_oversold,
        rsi_neutral,
        rsi_overbought,
        macd_cross_up,
        macd_cross_down,
        bollinger_position,
        bollinger_width,
        bollinger_squeeze,
        hour_of_day,
        day_of_week,
        is_weekend,
        is_market_open: if market_open { 1.0 } else { 0.0 },
        sma20_distance: fill(sma20_distance),
        sma50_distance: fill(sma50_distance),
        sma100_distance: fill(sma100_distance),
        sma200_distance: fill(sma200_distance),
        price_above_sma20: fill(price_above_sma20),
        price_above_sma50: fill(price_above_sma50),
        price_above_sma100: fill(price_above_sma100),
        price_above_sma200: fill(price_above_sma200),
        trend_strength: fill(trend_strength),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketflow_model::Timeframe;

    fn candle(ts: i64, close: f64, volume: f64) -> Candle {
        Candle {
            ts_bucket: ts,
            timeframe: Timeframe::OneMinute,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
            trade_count: 1,
            completed: true,
        }
    }

    #[test]
    fn missing_history_fills_to_zero() {
        let candles = vec![candle(0, 100.0, 10.0)];
        let row = compute_feature_row(&candles, &IndicatorRow::default(), true);
        assert_eq!(row.return_1, 0.0);
        assert_eq!(row.sma20_distance, 0.0);
        assert_eq!(row.feature_version, FEATURE_VERSION);
    }

    #[test]
    fn return_1_matches_simple_pct_change() {
        let candles = vec![candle(0, 100.0, 10.0), candle(60_000, 110.0, 10.0)];
        let row = compute_feature_row(&candles, &IndicatorRow::default(), true);
        assert!((row.return_1 - 0.10).abs() < 1e-9);
    }

    #[test]
    fn market_open_flag_passes_through() {
        let candles = vec![candle(0, 100.0, 10.0)];
        let row = compute_feature_row(&candles, &IndicatorRow::default(), false);
        assert_eq!(row.is_market_open, 0.0);
    }
}
