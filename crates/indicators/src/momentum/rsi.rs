use std::fmt::Display;

use crate::average::WilderMovingAverage;
use crate::indicator::{Indicator, MovingAverage};

/// Relative strength index using Wilder's smoothing of gains/losses
/// (spec §4.5: "RSI(14): Wilder's smoothing of gains/losses").
#[derive(Debug)]
pub struct RelativeStrengthIndex {
    pub period: usize,
    pub value: f64,
    pub count: usize,
    pub initialized: bool,
    has_inputs: bool,
    last_value: f64,
    average_gain: WilderMovingAverage,
    average_loss: WilderMovingAverage,
}

impl Display for RelativeStrengthIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.period)
    }
}

impl Indicator for RelativeStrengthIndex {
    fn name(&self) -> String {
        "RelativeStrengthIndex".to_string()
    }

    fn has_inputs(&self) -> bool {
        self.has_inputs
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn reset(&mut self) {
        self.value = 0.0;
        self.last_value = 0.0;
        self.count = 0;
        self.has_inputs = false;
        self.initialized = false;
        self.average_gain.reset();
        self.average_loss.reset();
    }
}

impl RelativeStrengthIndex {
    /// # Panics
    /// Panics if `period` is zero.
    #[must_use]
    pub fn new(period: usize) -> Self {
        Self {
            period,
            value: 0.0,
            count: 0,
            has_inputs: false,
            last_value: 0.0,
            average_gain: WilderMovingAverage::new(period),
            average_loss: WilderMovingAverage::new(period),
            initialized: false,
        }
    }

    pub fn update_raw(&mut self, value: f64) {
        if !self.has_inputs {
            self.last_value = value;
            self.has_inputs = true;
        }
        let change = value - self.last_value;
        if change > 0.0 {
            self.average_gain.update_raw(change);
            self.average_loss.update_raw(0.0);
        } else if change < 0.0 {
            self.average_loss.update_raw(-change);
            self.average_gain.update_raw(0.0);
        } else {
            self.average_gain.update_raw(0.0);
            self.average_loss.update_raw(0.0);
        }

        self.count = self.average_gain.count();
        self.last_value = value;

        if self.average_loss.value() == 0.0 {
            self.value = 100.0;
        } else {
            let rs = self.average_gain.value() / self.average_loss.value();
            self.value = 100.0 - (100.0 / (1.0 + rs));
        }

        if !self.initialized && self.count >= self.period {
            self.initialized = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_gains_saturates_at_100() {
        let mut rsi = RelativeStrengthIndex::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            rsi.update_raw(v);
        }
        assert!(rsi.initialized());
        assert_eq!(rsi.value, 100.0);
    }

    #[test]
    fn all_losses_drives_toward_zero() {
        let mut rsi = RelativeStrengthIndex::new(3);
        for v in [5.0, 4.0, 3.0, 2.0, 1.0] {
            rsi.update_raw(v);
        }
        assert_eq!(rsi.value, 0.0);
    }

    #[test]
    fn not_initialized_below_period() {
        let mut rsi = RelativeStrengthIndex::new(14);
        rsi.update_raw(100.0);
        rsi.update_raw(101.0);
        assert!(!rsi.initialized());
    }
}
