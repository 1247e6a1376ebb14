//! Core types shared across the MarketFlow workspace.
//!
//! This crate has no dependency on any other workspace crate: it provides
//! the `Clock` capability, timestamp helpers, and the error taxonomy that
//! every other crate builds on.

#![warn(rustc::all)]
#![deny(clippy::missing_errors_doc)]

pub mod clock;
pub mod error;
pub mod time;

pub use clock::{Clock, SystemClock, TestClock};
pub use error::{MarketFlowError, Result};
