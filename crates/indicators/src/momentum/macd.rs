use std::fmt::Display;

use crate::average::ExponentialMovingAverage;
use crate::indicator::{Indicator, MovingAverage};

/// MACD(12,26,9): `line = EMA_fast - EMA_slow`, `signal = EMA(line, 9)`,
/// `hist = line - signal` (spec §4.5).
#[derive(Debug)]
pub struct MovingAverageConvergenceDivergence {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    pub value: f64,
    pub signal: f64,
    pub initialized: bool,
    fast: ExponentialMovingAverage,
    slow: ExponentialMovingAverage,
    signal_ma: ExponentialMovingAverage,
}

impl Display for MovingAverageConvergenceDivergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({},{},{})",
            self.name(),
            self.fast_period,
            self.slow_period,
            self.signal_period
        )
    }
}

impl Indicator for MovingAverageConvergenceDivergence {
    fn name(&self) -> String {
        "MovingAverageConvergenceDivergence".to_string()
    }

    fn has_inputs(&self) -> bool {
        self.fast.has_inputs()
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn reset(&mut self) {
        self.value = 0.0;
        self.signal = 0.0;
        self.initialized = false;
        self.fast.reset();
        self.slow.reset();
        self.signal_ma.reset();
    }
}

impl MovingAverageConvergenceDivergence {
    #[must_use]
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
            signal_period,
            value: 0.0,
            signal: 0.0,
            initialized: false,
            fast: ExponentialMovingAverage::new(fast_period),
            slow: ExponentialMovingAverage::new(slow_period),
            signal_ma: ExponentialMovingAverage::new(signal_period),
        }
    }

    #[must_use]
    pub fn histogram(&self) -> f64 {
        self.value - self.signal
    }

    pub fn update_raw(&mut self, value: f64) {
        self.fast.update_raw(value);
        self.slow.update_raw(value);

        if self.fast.initialized() && self.slow.initialized() {
            self.value = self.fast.value() - self.slow.value();
            self.signal_ma.update_raw(self.value);
            self.signal = self.signal_ma.value();
            if self.signal_ma.initialized() {
                self.initialized = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_slow_and_signal_periods_to_initialize() {
        let mut macd = MovingAverageConvergenceDivergence::new(2, 3, 2);
        for i in 0..3 {
            macd.update_raw(f64::from(i));
        }
        assert!(!macd.initialized());
        macd.update_raw(10.0);
        assert!(macd.initialized());
        assert!((macd.histogram() - (macd.value - macd.signal)).abs() < 1e-12);
    }
}
