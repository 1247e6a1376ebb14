use std::collections::VecDeque;
use std::fmt::Display;

use crate::average::SimpleMovingAverage;
use crate::indicator::{Indicator, MovingAverage};

/// Stochastic oscillator(14,3,3): `%K_raw = 100*(close - lowest_low)/(highest_high - lowest_low)`
/// over `period_k`, `%K` is `%K_raw` slowed by an SMA over `period_slow`,
/// `%D` is `%K` smoothed by an SMA over `period_d` (spec §4.5).
#[derive(Debug)]
pub struct Stochastic {
    pub period_k: usize,
    pub period_slow: usize,
    pub period_d: usize,
    pub k: f64,
    pub d: f64,
    pub initialized: bool,
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
    k_slow: SimpleMovingAverage,
    d_ma: SimpleMovingAverage,
}

impl Display for Stochastic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({},{},{})",
            self.name(),
            self.period_k,
            self.period_slow,
            self.period_d
        )
    }
}

impl Indicator for Stochastic {
    fn name(&self) -> String {
        "Stochastic".to_string()
    }

    fn has_inputs(&self) -> bool {
        !self.highs.is_empty()
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn reset(&mut self) {
        self.k = 0.0;
        self.d = 0.0;
        self.initialized = false;
        self.highs.clear();
        self.lows.clear();
        self.k_slow.reset();
        self.d_ma.reset();
    }
}

impl Stochastic {
    #[must_use]
    pub fn new(period_k: usize, period_slow: usize, period_d: usize) -> Self {
        Self {
            period_k,
            period_slow,
            period_d,
            k: 0.0,
            d: 0.0,
            initialized: false,
            highs: VecDeque::with_capacity(period_k),
            lows: VecDeque::with_capacity(period_k),
            k_slow: SimpleMovingAverage::new(period_slow),
            d_ma: SimpleMovingAverage::new(period_d),
        }
    }

    pub fn update_raw(&mut self, high: f64, low: f64, close: f64) {
        if self.highs.len() == self.period_k {
            self.highs.pop_front();
            self.lows.pop_front();
        }
        self.highs.push_back(high);
        self.lows.push_back(low);

        if self.highs.len() < self.period_k {
            return;
        }

        let highest = self.highs.iter().cloned().fold(f64::MIN, f64::max);
        let lowest = self.lows.iter().cloned().fold(f64::MAX, f64::min);
        let range = highest - lowest;
        let k_raw = if range == 0.0 {
            50.0
        } else {
            100.0 * (close - lowest) / range
        };

        self.k_slow.update_raw(k_raw);
        if !self.k_slow.initialized() {
            return;
        }
        self.k = self.k_slow.value();

        self.d_ma.update_raw(self.k);
        if self.d_ma.initialized() {
            self.d = self.d_ma.value();
            self.initialized = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_at_high_of_range_saturates_k() {
        let mut st = Stochastic::new(3, 1, 1);
        st.update_raw(10.0, 5.0, 8.0);
        st.update_raw(12.0, 6.0, 9.0);
        st.update_raw(14.0, 7.0, 14.0);
        assert!(st.initialized());
        assert!((st.k - 100.0).abs() < 1e-9);
    }
}
