use std::fmt::Display;

use crate::indicator::{Indicator, MovingAverage};

/// Wilder's smoothing moving average, `alpha = 1 / period`. Used by RSI,
/// ATR, and ADX per spec §4.5, all of which call for "Wilder's smoothing"
/// explicitly rather than a plain EMA.
#[derive(Debug)]
pub struct WilderMovingAverage {
    pub period: usize,
    pub alpha: f64,
    pub value: f64,
    pub count: usize,
    pub initialized: bool,
    has_inputs: bool,
}

impl Display for WilderMovingAverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.period)
    }
}

impl Indicator for WilderMovingAverage {
    fn name(&self) -> String {
        "WilderMovingAverage".to_string()
    }

    fn has_inputs(&self) -> bool {
        self.has_inputs
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn reset(&mut self) {
        self.value = 0.0;
        self.count = 0;
        self.has_inputs = false;
        self.initialized = false;
    }
}

impl MovingAverage for WilderMovingAverage {
    fn update_raw(&mut self, value: f64) {
        if !self.has_inputs {
            self.value = value;
            self.has_inputs = true;
        } else {
            self.value = self.alpha * value + (1.0 - self.alpha) * self.value;
        }
        self.count += 1;
        if !self.initialized && self.count >= self.period {
            self.initialized = true;
        }
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn count(&self) -> usize {
        self.count
    }
}

impl WilderMovingAverage {
    /// # Panics
    /// Panics if `period` is zero.
    #[must_use]
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "period must be positive");
        Self {
            period,
            alpha: 1.0 / period as f64,
            value: 0.0,
            count: 0,
            has_inputs: false,
            initialized: false,
        }
    }
}
