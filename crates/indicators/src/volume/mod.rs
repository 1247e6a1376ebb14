//! Volume family indicators.

use crate::average::SimpleMovingAverage;
use crate::indicator::MovingAverage;

/// Volume-SMA(20): a plain [`SimpleMovingAverage`] fed with bar volume
/// instead of price.
#[derive(Debug)]
pub struct VolumeSma(SimpleMovingAverage);

impl VolumeSma {
    #[must_use]
    pub fn new(period: usize) -> Self {
        Self(SimpleMovingAverage::new(period))
    }

    pub fn update_raw(&mut self, volume: f64) {
        self.0.update_raw(volume);
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.0.value()
    }

    #[must_use]
    pub fn initialized(&self) -> bool {
        self.0.initialized
    }
}
