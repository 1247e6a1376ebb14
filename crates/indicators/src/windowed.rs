//! Batch recomputation of the fixed indicator set over a rolling window
//! (spec §4.5): feed every incremental indicator the whole window in order
//! and keep only the final, latest row. `None` means "insufficient history"
//! for that series, per spec.

use marketflow_model::indicator_row::{Bollinger, Ema, Macd, Sma, Stochastic as StochasticRow};
use marketflow_model::{Candle, IndicatorRow};

use crate::average::{ExponentialMovingAverage, SimpleMovingAverage, VolumeWeightedAveragePrice};
use crate::indicator::MovingAverage;
use crate::momentum::{BollingerBands, MovingAverageConvergenceDivergence, RelativeStrengthIndex};
use crate::momentum::Stochastic;
use crate::volatility::{AverageDirectionalIndex, AverageTrueRange};
use crate::volume::VolumeSma;

const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const BB_PERIOD: usize = 20;
const BB_K: f64 = 2.0;
const SMA_PERIODS: [usize; 4] = [20, 50, 100, 200];
const EMA_PERIODS: [usize; 3] = [12, 26, 50];
const STOCH_K: usize = 14;
const STOCH_SLOW: usize = 3;
const STOCH_D: usize = 3;
const ATR_PERIOD: usize = 14;
const ADX_PERIOD: usize = 14;
const VOLUME_SMA_PERIOD: usize = 20;

/// Recomputes the fixed indicator set over `candles` (oldest first) and
/// returns only the latest row. `candles` should be the last N completed
/// bars for a `(symbol, timeframe)`, per spec §4.5 (default N=200).
#[must_use]
pub fn compute_indicator_row(candles: &[Candle]) -> IndicatorRow {
    let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD);
    let mut macd = MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let mut bb = BollingerBands::new(BB_PERIOD, BB_K);
    let mut smas: Vec<SimpleMovingAverage> =
        SMA_PERIODS.iter().map(|&p| SimpleMovingAverage::new(p)).collect();
    let mut emas: Vec<ExponentialMovingAverage> =
        EMA_PERIODS.iter().map(|&p| ExponentialMovingAverage::new(p)).collect();
    let mut vwap = VolumeWeightedAveragePrice::new();
    let mut stoch = Stochastic::new(STOCH_K, STOCH_SLOW, STOCH_D);
    let mut atr = AverageTrueRange::new(ATR_PERIOD);
    let mut adx = AverageDirectionalIndex::new(ADX_PERIOD);
    let mut vol_sma = VolumeSma::new(VOLUME_SMA_PERIOD);

    for candle in candles {
        let close = candle.close;
        rsi.update_raw(close);
        macd.update_raw(close);
        bb.update_raw(close);
        for sma in &mut smas {
            sma.update_raw(close);
        }
        for ema in &mut emas {
            ema.update_raw(close);
        }
        let typical = (candle.high + candle.low + candle.close) / 3.0;
        vwap.update_raw(typical, candle.volume);
        stoch.update_raw(candle.high, candle.low, close);
        atr.update_raw(candle.high, candle.low, close);
        adx.update_raw(candle.high, candle.low, close);
        vol_sma.update_raw(candle.volume);
    }

    let Some(last) = candles.last() else {
        return IndicatorRow::default();
    };

    IndicatorRow {
        ts_bucket: last.ts_bucket,
        timeframe: Some(last.timeframe),
        rsi: rsi.initialized.then_some(rsi.value),
        macd: macd.initialized.then_some(Macd {
            line: macd.value,
            signal: macd.signal,
            hist: macd.histogram(),
        }),
        bollinger: bb.initialized.then_some(Bollinger {
            upper: bb.upper,
            middle: bb.middle,
            lower: bb.lower,
        }),
        sma: Sma {
            s20: smas[0].initialized.then_some(smas[0].value()),
            s50: smas[1].initialized.then_some(smas[1].value()),
            s100: smas[2].initialized.then_some(smas[2].value()),
            s200: smas[3].initialized.then_some(smas[3].value()),
        },
        ema: Ema {
            e12: emas[0].initialized.then_some(emas[0].value()),
            e26: emas[1].initialized.then_some(emas[1].value()),
            e50: emas[2].initialized.then_some(emas[2].value()),
        },
        vwap: vwap.initialized.then_some(vwap.value),
        stochastic: stoch.initialized.then_some(StochasticRow {
            k: stoch.k,
            d: stoch.d,
        }),
        atr: atr.initialized.then_some(atr.value),
        adx: adx.initialized.then_some(adx.value),
        volume_sma: vol_sma.initialized().then_some(vol_sma.value()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketflow_model::Timeframe;

    fn candle(ts: i64, o: f64, h: f64, l: f64, c: f64, v: f64) -> Candle {
        Candle {
            ts_bucket: ts,
            timeframe: Timeframe::OneMinute,
            open: o,
            high: h,
            low: l,
            close: c,
            volume: v,
            trade_count: 1,
            completed: true,
        }
    }

    #[test]
    fn indicator_is_null_below_its_period() {
        let candles: Vec<Candle> = (0..5)
            .map(|i| candle(i * 60_000, 100.0 + i as f64, 101.0 + i as f64, 99.0 + i as f64, 100.0 + i as f64, 10.0))
            .collect();
        let row = compute_indicator_row(&candles);
        assert!(row.rsi.is_none());
        assert!(row.sma.s20.is_none());
    }

    #[test]
    fn sma20_initializes_at_exactly_20_bars() {
        let candles: Vec<Candle> = (0..20)
            .map(|i| candle(i * 60_000, 100.0, 101.0, 99.0, 100.0, 10.0))
            .collect();
        let row = compute_indicator_row(&candles);
        assert_eq!(row.sma.s20, Some(100.0));
        assert!(row.sma.s50.is_none());
    }

    #[test]
    fn replay_is_deterministic() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| candle(i * 60_000, 100.0 + (i % 7) as f64, 102.0 + (i % 7) as f64, 98.0 + (i % 7) as f64, 101.0 + (i % 7) as f64, 5.0 + (i % 3) as f64))
            .collect();
        let row1 = compute_indicator_row(&candles);
        let row2 = compute_indicator_row(&candles);
        assert_eq!(row1, row2);
    }
}
