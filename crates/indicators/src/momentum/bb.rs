use std::collections::VecDeque;
use std::fmt::Display;

use crate::indicator::Indicator;

/// Bollinger Bands(20, 2σ): `middle = SMA(20)`, `upper/lower = middle ± k·stdev(20)`.
#[derive(Debug)]
pub struct BollingerBands {
    pub period: usize,
    pub k: f64,
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub initialized: bool,
    buf: VecDeque<f64>,
}

impl Display for BollingerBands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({},{})", self.name(), self.period, self.k)
    }
}

impl Indicator for BollingerBands {
    fn name(&self) -> String {
        "BollingerBands".to_string()
    }

    fn has_inputs(&self) -> bool {
        !self.buf.is_empty()
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn reset(&mut self) {
        self.upper = 0.0;
        self.middle = 0.0;
        self.lower = 0.0;
        self.initialized = false;
        self.buf.clear();
    }
}

impl BollingerBands {
    /// # Panics
    /// Panics if `period` is zero.
    #[must_use]
    pub fn new(period: usize, k: f64) -> Self {
        assert!(period > 0, "period must be positive");
        Self {
            period,
            k,
            upper: 0.0,
            middle: 0.0,
            lower: 0.0,
            initialized: false,
            buf: VecDeque::with_capacity(period),
        }
    }

    pub fn update_raw(&mut self, value: f64) {
        if self.buf.len() == self.period {
            self.buf.pop_front();
        }
        self.buf.push_back(value);

        if self.buf.len() < self.period {
            return;
        }

        let mean = self.buf.iter().sum::<f64>() / self.period as f64;
        let variance =
            self.buf.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.period as f64;
        let stdev = variance.sqrt();

        self.middle = mean;
        self.upper = mean + self.k * stdev;
        self.lower = mean - self.k * stdev;
        self.initialized = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_series_collapses_bands_to_the_mean() {
        let mut bb = BollingerBands::new(5, 2.0);
        for _ in 0..5 {
            bb.update_raw(10.0);
        }
        assert!(bb.initialized());
        assert_eq!(bb.middle, 10.0);
        assert_eq!(bb.upper, 10.0);
        assert_eq!(bb.lower, 10.0);
    }

    #[test]
    fn not_initialized_before_period_fills() {
        let mut bb = BollingerBands::new(20, 2.0);
        for i in 0..19 {
            bb.update_raw(f64::from(i));
        }
        assert!(!bb.initialized());
    }
}
