//! Quality checking, bar aggregation, feature derivation, and the optional
//! idle-flush task for the MarketFlow platform. See spec §4.3, §4.4, §4.6.

#![warn(rustc::all)]

pub mod bar_builder;
pub mod feature_engineer;
pub mod idle_flusher;
pub mod quality;

pub use bar_builder::{BarBuilder, Completion};
pub use feature_engineer::compute_feature_row;
pub use idle_flusher::{IdleFlusher, IdleFlusherConfig};
pub use quality::{CheckOutcome, CheckResult, QualityChecker, QuarantineEntry};
