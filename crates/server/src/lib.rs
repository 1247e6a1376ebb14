//! The MarketFlow server: configuration, the symbol catalog, indicator
//! orchestration, WS fan-out, auth/health seams, and the REST/WebSocket
//! surface built on top of them.

#![warn(rustc::all)]

pub mod auth;
pub mod catalog;
pub mod config;
pub mod health;
pub mod orchestrator;
pub mod rest;
pub mod ws_fanout;

pub use auth::{AuthVerifier, DevAuthVerifier, Identity};
pub use catalog::SymbolCatalog;
pub use config::{load, MarketFlowConfig};
pub use health::{HealthAggregator, OverallStatus};
pub use orchestrator::IndicatorOrchestrator;
pub use rest::{router, AppState};
pub use ws_fanout::WsFanout;
