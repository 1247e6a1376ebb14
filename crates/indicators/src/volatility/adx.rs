use std::fmt::Display;

use crate::average::WilderMovingAverage;
use crate::indicator::{Indicator, MovingAverage};

/// Average Directional Index(14), Wilder's method: directional movement
/// and true range are each Wilder-smoothed, `DX = 100*|+DI - -DI|/(+DI + -DI)`,
/// `ADX` is Wilder's smoothing of `DX` (spec §4.5).
#[derive(Debug)]
pub struct AverageDirectionalIndex {
    pub period: usize,
    pub value: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub initialized: bool,
    has_inputs: bool,
    prev_high: f64,
    prev_low: f64,
    prev_close: f64,
    smoothed_tr: WilderMovingAverage,
    smoothed_plus_dm: WilderMovingAverage,
    smoothed_minus_dm: WilderMovingAverage,
    smoothed_dx: WilderMovingAverage,
}

impl Display for AverageDirectionalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.period)
    }
}

impl Indicator for AverageDirectionalIndex {
    fn name(&self) -> String {
        "AverageDirectionalIndex".to_string()
    }

    fn has_inputs(&self) -> bool {
        self.has_inputs
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn reset(&mut self) {
        self.value = 0.0;
        self.plus_di = 0.0;
        self.minus_di = 0.0;
        self.initialized = false;
        self.has_inputs = false;
        self.prev_high = 0.0;
        self.prev_low = 0.0;
        self.prev_close = 0.0;
        self.smoothed_tr.reset();
        self.smoothed_plus_dm.reset();
        self.smoothed_minus_dm.reset();
        self.smoothed_dx.reset();
    }
}

impl AverageDirectionalIndex {
    #[must_use]
    pub fn new(period: usize) -> Self {
        Self {
            period,
            value: 0.0,
            plus_di: 0.0,
            minus_di: 0.0,
            initialized: false,
            has_inputs: false,
            prev_high: 0.0,
            prev_low: 0.0,
            prev_close: 0.0,
            smoothed_tr: WilderMovingAverage::new(period),
            smoothed_plus_dm: WilderMovingAverage::new(period),
            smoothed_minus_dm: WilderMovingAverage::new(period),
            smoothed_dx: WilderMovingAverage::new(period),
        }
    }

    pub fn update_raw(&mut self, high: f64, low: f64, close: f64) {
        if !self.has_inputs {
            self.has_inputs = true;
            self.prev_high = high;
            self.prev_low = low;
            self.prev_close = close;
            return;
        }

        let up_move = high - self.prev_high;
        let down_move = self.prev_low - low;

        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };

        let tr = (high - low)
            .max((high - self.prev_close).abs())
            .max((low - self.prev_close).abs());

        self.smoothed_tr.update_raw(tr);
        self.smoothed_plus_dm.update_raw(plus_dm);
        self.smoothed_minus_dm.update_raw(minus_dm);

        self.prev_high = high;
        self.prev_low = low;
        self.prev_close = close;

        if self.smoothed_tr.value() == 0.0 {
            return;
        }

        self.plus_di = 100.0 * self.smoothed_plus_dm.value() / self.smoothed_tr.value();
        self.minus_di = 100.0 * self.smoothed_minus_dm.value() / self.smoothed_tr.value();

        let di_sum = self.plus_di + self.minus_di;
        let dx = if di_sum == 0.0 {
            0.0
        } else {
            100.0 * (self.plus_di - self.minus_di).abs() / di_sum
        };

        self.smoothed_dx.update_raw(dx);
        self.value = self.smoothed_dx.value();
        if self.smoothed_dx.initialized() {
            self.initialized = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_seed_bar_plus_period_to_initialize() {
        let mut adx = AverageDirectionalIndex::new(3);
        let bars = [
            (10.0, 8.0, 9.0),
            (11.0, 9.0, 10.0),
            (12.0, 10.0, 11.0),
            (13.0, 11.0, 12.0),
        ];
        for (h, l, c) in bars {
            adx.update_raw(h, l, c);
        }
        assert!(adx.initialized());
        assert!(adx.value >= 0.0);
    }
}
