//! Distributed token-bucket rate limiter (spec §4.9), shared by the
//! `PolledRateLimited` venue and the streaming venue's REST backfill path.
//!
//! State lives in the cache so multiple process instances could in
//! principle share a budget; per spec §9's "Rate-limit Lua-less emulation"
//! note, the read-then-write across two cache calls is not atomic. We
//! accept the resulting `O(1)` over-admission bound under concurrent
//! callers rather than reaching for a server-side script, and document it
//! here rather than silently claiming strict correctness.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marketflow_core::clock::Clock;
use marketflow_core::error::Result;
use marketflow_infrastructure::CacheClient;
use marketflow_model::{Candle, Timeframe};

use crate::collector::{CollectedEvent, VenueSource};

/// `allow()`'s verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Allow,
    Deny { retry_after_secs: u64 },
}

/// A token bucket identified by `client_id`, refilling at `rate` tokens
/// per `period`.
pub struct RateLimiter {
    cache: Arc<CacheClient>,
    clock: Arc<dyn Clock>,
    capacity: f64,
    rate: f64,
    period_secs: u64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(cache: Arc<CacheClient>, clock: Arc<dyn Clock>, capacity: f64, rate: f64, period_secs: u64) -> Self {
        Self { cache, clock, capacity, rate, period_secs }
    }

    /// Attempts to spend `cost` tokens from `client_id`'s bucket. Fails
    /// **open** (allows, logging a warning) if the cache is unreachable —
    /// the explicit availability/integrity trade-off spec §4.9 calls for.
    pub async fn allow(&self, client_id: &str, cost: f64) -> Decision {
        let now_ms = self.clock.now_ms();
        let existing = match self.cache.get_rate_limit_bucket(client_id).await {
            Ok(bucket) => bucket,
            Err(err) => {
                tracing::warn!(%client_id, error = %err, "rate limit cache unreachable, failing open");
                return Decision::Allow;
            }
        };

        let (prev_tokens, last_refill_ms) = existing.unwrap_or((self.capacity, now_ms));
        let elapsed_secs = (now_ms - last_refill_ms).max(0) as f64 / 1000.0;
        let refill_rate_per_sec = self.rate / self.period_secs as f64;
        let tokens = (prev_tokens + elapsed_secs * refill_rate_per_sec).min(self.capacity);

        if tokens >= cost {
            let remaining = tokens - cost;
            if let Err(err) = self
                .cache
                .set_rate_limit_bucket(client_id, remaining, now_ms, self.period_secs)
                .await
            {
                tracing::warn!(%client_id, error = %err, "failed to persist rate limit bucket, allowing anyway");
            }
            Decision::Allow
        } else {
            let deficit = cost - tokens;
            let retry_after_secs = (deficit / refill_rate_per_sec).ceil().max(1.0) as u64;
            Decision::Deny { retry_after_secs }
        }
    }
}

/// Wraps a [`VenueSource`] so `poll()` only delegates to the inner source
/// when the local token budget allows it; otherwise the cycle is skipped
/// (no error, no reconnect) until tokens refill. This is the
/// `PolledRateLimited` venue's "local sliding window" (spec §4.2).
pub struct RateLimitedSource<S: VenueSource> {
    inner: S,
    limiter: RateLimiter,
    client_id: String,
}

impl<S: VenueSource> RateLimitedSource<S> {
    #[must_use]
    pub fn new(inner: S, limiter: RateLimiter, client_id: impl Into<String>) -> Self {
        Self { inner, limiter, client_id: client_id.into() }
    }
}

#[async_trait]
impl<S: VenueSource> VenueSource for RateLimitedSource<S> {
    async fn connect(&mut self) -> Result<()> {
        self.inner.connect().await
    }

    async fn subscribe(&mut self, symbols: &[String]) -> Result<()> {
        self.inner.subscribe(symbols).await
    }

    async fn poll(&mut self) -> Result<Vec<CollectedEvent>> {
        match self.limiter.allow(&self.client_id, 1.0).await {
            Decision::Allow => self.inner.poll().await,
            Decision::Deny { retry_after_secs } => {
                tracing::debug!(client_id = %self.client_id, retry_after_secs, "rate limit budget exhausted, skipping poll");
                Ok(vec![])
            }
        }
    }

    async fn fetch_historical(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        self.inner.fetch_historical(symbol, timeframe, from, to).await
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.inner.disconnect().await
    }
}
