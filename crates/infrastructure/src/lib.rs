//! Redis hot cache, Postgres time-series store, and the per-component
//! circuit breaker backing MarketFlow's I/O boundaries (spec §4.1, §6).

#![warn(rustc::all)]

pub mod cache;
pub mod circuit_breaker;
pub mod store;

pub use cache::CacheClient;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, GuardError, State};
pub use store::TimeseriesStore;
