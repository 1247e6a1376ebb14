//! Workspace-wide error taxonomy.
//!
//! Every fallible boundary in MarketFlow returns a [`MarketFlowError`]
//! variant rather than a generic string or a panic. Binaries collapse these
//! into `anyhow::Result` at the outermost edge (the collector run-loop, the
//! server's request handlers); everywhere else the typed variant is matched
//! on to decide policy (retry, drop, surface as HTTP status).

use std::time::Duration;

use thiserror::Error;

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, MarketFlowError>;

/// The error kinds produced by MarketFlow components.
///
/// Variants map directly to the error-handling policy in the platform
/// design: transient I/O retries locally, `CircuitOpen` bubbles to the
/// caller for backoff, `QualityRejected` is logged and dropped, never
/// fatal.
#[derive(Debug, Error)]
pub enum MarketFlowError {
    /// The named component's circuit breaker is open; retry after the
    /// given duration has elapsed.
    #[error("circuit open for {component}, retry after {retry_after:?}")]
    CircuitOpen {
        component: String,
        retry_after: Duration,
    },

    /// A tick failed quality validation; `reason` is the first check that
    /// short-circuited.
    #[error("quality rejected for {symbol}: {reason}")]
    QualityRejected { symbol: String, reason: String },

    /// The time-series store is unavailable or returned an error.
    #[error("store error: {0}")]
    Store(String),

    /// The cache (Redis) is unavailable or returned an error.
    #[error("cache error: {0}")]
    Cache(String),

    /// A malformed or unexpected wire message from a venue.
    #[error("protocol error from {venue}: {0}", venue = .venue)]
    Protocol { venue: String, message: String },

    /// Configuration is missing or invalid.
    #[error("config error: {0}")]
    Config(String),

    /// An upstream venue rate-limited us (HTTP 429 or equivalent).
    #[error("rate limited by {venue}, retry after {retry_after:?}")]
    RateLimited {
        venue: String,
        retry_after: Duration,
    },

    /// Network/transport failure talking to a venue.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}
