//! Momentum and oscillator family indicators.

pub mod bb;
pub mod macd;
pub mod rsi;
pub mod stochastic;

pub use bb::BollingerBands;
pub use macd::MovingAverageConvergenceDivergence;
pub use rsi::RelativeStrengthIndex;
pub use stochastic::Stochastic;
