//! Volume-weighted average price.
//!
//! Per spec §4.5 / §9, VWAP here is computed over the rolling N-bar window
//! passed in, not anchored to a session start — callers expecting session
//! VWAP should trim the window to start at the session open before calling.
//! `VwapAnchor` documents the intended option without requiring a market
//! calendar inside this crate.

use crate::indicator::Indicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VwapAnchor {
    /// Cumulative over whatever window is handed in (the default).
    Window,
    /// Would reset at session open; callers achieve this today by slicing
    /// the input window to the session, since this crate has no calendar.
    Session,
}

#[derive(Debug)]
pub struct VolumeWeightedAveragePrice {
    pub value: f64,
    pub initialized: bool,
    has_inputs: bool,
    price_volume: f64,
    volume_total: f64,
}

impl Indicator for VolumeWeightedAveragePrice {
    fn name(&self) -> String {
        "VolumeWeightedAveragePrice".to_string()
    }

    fn has_inputs(&self) -> bool {
        self.has_inputs
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn reset(&mut self) {
        self.value = 0.0;
        self.has_inputs = false;
        self.initialized = false;
        self.price_volume = 0.0;
        self.volume_total = 0.0;
    }
}

impl std::fmt::Display for VolumeWeightedAveragePrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Default for VolumeWeightedAveragePrice {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeWeightedAveragePrice {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: 0.0,
            initialized: false,
            has_inputs: false,
            price_volume: 0.0,
            volume_total: 0.0,
        }
    }

    /// Feeds one bar's typical price (`(h+l+c)/3`) weighted by its volume.
    pub fn update_raw(&mut self, typical_price: f64, volume: f64) {
        self.has_inputs = true;
        self.price_volume += typical_price * volume;
        self.volume_total += volume;
        if self.volume_total > 0.0 {
            self.value = self.price_volume / self.volume_total;
            self.initialized = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_by_volume() {
        let mut vwap = VolumeWeightedAveragePrice::new();
        vwap.update_raw(10.0, 1.0);
        vwap.update_raw(20.0, 3.0);
        // (10*1 + 20*3) / 4 = 17.5
        assert!((vwap.value - 17.5).abs() < 1e-9);
    }
}
