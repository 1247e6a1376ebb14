use std::fmt::Display;

use crate::average::WilderMovingAverage;
use crate::indicator::{Indicator, MovingAverage};

/// Average True Range(14): Wilder's smoothing of the true range,
/// `TR = max(high-low, |high-prev_close|, |low-prev_close|)` (spec §4.5).
#[derive(Debug)]
pub struct AverageTrueRange {
    pub period: usize,
    pub value: f64,
    pub initialized: bool,
    has_inputs: bool,
    prev_close: f64,
    smoothed: WilderMovingAverage,
}

impl Display for AverageTrueRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.period)
    }
}

impl Indicator for AverageTrueRange {
    fn name(&self) -> String {
        "AverageTrueRange".to_string()
    }

    fn has_inputs(&self) -> bool {
        self.has_inputs
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn reset(&mut self) {
        self.value = 0.0;
        self.initialized = false;
        self.has_inputs = false;
        self.prev_close = 0.0;
        self.smoothed.reset();
    }
}

impl AverageTrueRange {
    #[must_use]
    pub fn new(period: usize) -> Self {
        Self {
            period,
            value: 0.0,
            initialized: false,
            has_inputs: false,
            prev_close: 0.0,
            smoothed: WilderMovingAverage::new(period),
        }
    }

    pub fn update_raw(&mut self, high: f64, low: f64, close: f64) {
        let tr = if !self.has_inputs {
            high - low
        } else {
            (high - low)
                .max((high - self.prev_close).abs())
                .max((low - self.prev_close).abs())
        };

        self.has_inputs = true;
        self.prev_close = close;

        self.smoothed.update_raw(tr);
        self.value = self.smoothed.value();
        if self.smoothed.initialized() {
            self.initialized = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_bar_true_range_is_high_minus_low() {
        let mut atr = AverageTrueRange::new(3);
        atr.update_raw(10.0, 8.0, 9.0);
        assert_eq!(atr.value, 2.0);
    }

    #[test]
    fn initializes_after_period_bars() {
        let mut atr = AverageTrueRange::new(2);
        atr.update_raw(10.0, 8.0, 9.0);
        assert!(!atr.initialized());
        atr.update_raw(11.0, 9.0, 10.0);
        assert!(atr.initialized());
    }
}
