use std::collections::VecDeque;
use std::fmt::Display;

use crate::indicator::{Indicator, MovingAverage};

/// Simple moving average over a bounded ring buffer of the last `period`
/// values.
#[derive(Debug)]
pub struct SimpleMovingAverage {
    pub period: usize,
    pub value: f64,
    sum: f64,
    pub count: usize,
    buf: VecDeque<f64>,
    pub initialized: bool,
}

impl Display for SimpleMovingAverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.period)
    }
}

impl Indicator for SimpleMovingAverage {
    fn name(&self) -> String {
        "SimpleMovingAverage".to_string()
    }

    fn has_inputs(&self) -> bool {
        self.count > 0
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn reset(&mut self) {
        self.value = 0.0;
        self.sum = 0.0;
        self.count = 0;
        self.buf.clear();
        self.initialized = false;
    }
}

impl MovingAverage for SimpleMovingAverage {
    fn update_raw(&mut self, value: f64) {
        if self.buf.len() == self.period {
            let removed = self.buf.pop_front().unwrap_or(0.0);
            self.sum -= removed;
        }
        self.buf.push_back(value);
        self.sum += value;
        self.count += 1;
        self.value = self.sum / self.buf.len() as f64;

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

impl SimpleMovingAverage {
    /// # Panics
    /// Panics if `period` is zero.
    #[must_use]
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "period must be positive");
        Self {
            period,
            value: 0.0,
            sum: 0.0,
            count: 0,
            buf: VecDeque::with_capacity(period),
            initialized: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn becomes_initialized_at_period() {
        let mut sma = SimpleMovingAverage::new(3);
        sma.update_raw(1.0);
        sma.update_raw(2.0);
        assert!(!sma.initialized());
        sma.update_raw(3.0);
        assert!(sma.initialized());
        assert_eq!(sma.value(), 2.0);
    }

    #[test]
    fn rolls_off_oldest_value() {
        let mut sma = SimpleMovingAverage::new(2);
        sma.update_raw(10.0);
        sma.update_raw(20.0);
        assert_eq!(sma.value(), 15.0);
        sma.update_raw(30.0);
        assert_eq!(sma.value(), 25.0);
    }
}
