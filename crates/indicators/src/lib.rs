//! Technical analysis indicators for the MarketFlow platform.
//!
//! Each family (`average`, `momentum`, `volatility`, `volume`) provides
//! stateful, incrementally-updated indicators behind the [`indicator::Indicator`]
//! trait, the way the teacher platform's indicator library is organized.
//! [`windowed::compute_indicator_row`] is the entry point the Indicator
//! Engine (spec §4.5) calls on every bar completion: it replays an
//! indicator set over the last N bars and keeps only the latest values.

#![warn(rustc::all)]
#![deny(clippy::missing_panics_doc)]

pub mod average;
pub mod indicator;
pub mod momentum;
pub mod volatility;
pub mod volume;
pub mod windowed;

pub use indicator::{Indicator, MovingAverage};
pub use windowed::compute_indicator_row;
