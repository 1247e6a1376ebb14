//! Moving-average family indicators.

pub mod ema;
pub mod rma;
pub mod sma;
pub mod vwap;

pub use ema::ExponentialMovingAverage;
pub use rma::WilderMovingAverage;
pub use sma::SimpleMovingAverage;
pub use vwap::{VolumeWeightedAveragePrice, VwapAnchor};
