//! Common indicator traits, the unified interface every family implements.

use std::fmt::{Debug, Display};

/// The minimal interface shared by every indicator: a name for display, a
/// flag for whether it has seen any input, and whether it has accumulated
/// enough history to produce a meaningful value.
pub trait Indicator: Debug + Display {
    fn name(&self) -> String;
    fn has_inputs(&self) -> bool;
    fn initialized(&self) -> bool;
    fn reset(&mut self);
}

/// A moving average: something that can be fed a raw `f64` and queried for
/// its current value and sample count.
pub trait MovingAverage: Indicator {
    fn update_raw(&mut self, value: f64);
    fn value(&self) -> f64;
    fn count(&self) -> usize;
}
