//! Volatility family indicators.

pub mod adx;
pub mod atr;

pub use adx::AverageDirectionalIndex;
pub use atr::AverageTrueRange;
