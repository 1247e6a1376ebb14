//! Venue collectors (spec §4.2): the shared run-loop, the three venue
//! variants, the market-hours clock, and the token-bucket rate limiter.

#![warn(rustc::all)]

pub mod collector;
pub mod decoders;
pub mod market_clock;
pub mod polled_during_hours;
pub mod polled_rate_limited;
pub mod rate_limiter;
pub mod rest_source;
pub mod streaming;
pub mod ws_source;

pub use collector::{CollectedEvent, CollectorRunner, ReconnectBackoff, RunGate, VenueSource};
pub use decoders::{JsonRestDecoder, JsonStreamDecoder};
pub use market_clock::MarketClock;
pub use rate_limiter::{Decision, RateLimitedSource, RateLimiter};
pub use rest_source::{ResponseDecoder, RestPollSource};
pub use ws_source::{FrameDecoder, WsJsonSource};
