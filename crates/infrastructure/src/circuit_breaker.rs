//! Per-component fault isolation circuit breaker (spec §4.1).
//!
//! One breaker guards one fallible I/O boundary (a collector's connect/fetch
//! path, a store write). State mutation is serialized behind an internal
//! mutex, matching the spec's explicit "not safe to split across contenders
//! without internal locking" note — this is deliberately simpler than the
//! teacher's lock-free counters since a breaker's call rate is low compared
//! to the hot indicator path.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use marketflow_core::clock::Clock;
use marketflow_core::error::MarketFlowError;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
    pub success_threshold: u32,
    pub max_timeout: Duration,
    pub exponential_backoff: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            success_threshold: 2,
            max_timeout: Duration::from_secs(300),
            exponential_backoff: true,
        }
    }
}

struct Inner {
    state: State,
    failure_count: u32,
    success_count: u32,
    current_timeout: Duration,
    opened_at_ms: i64,
}

/// The error `guard` produces: either the breaker is open, or `op` itself
/// failed with `E`.
#[derive(Debug, thiserror::Error)]
pub enum GuardError<E> {
    #[error("circuit open for {component}, retry after {retry_after:?}")]
    Open { component: String, retry_after: Duration },
    #[error(transparent)]
    Inner(E),
}

impl<E: std::fmt::Display> From<GuardError<E>> for MarketFlowError {
    fn from(err: GuardError<E>) -> Self {
        match err {
            GuardError::Open { component, retry_after } => {
                Self::CircuitOpen { component, retry_after }
            }
            GuardError::Inner(e) => Self::Transport(std::io::Error::other(e.to_string())),
        }
    }
}

/// Guards one fallible operation with CLOSED/OPEN/HALF_OPEN state (spec
/// §4.1).
pub struct CircuitBreaker {
    component: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(
        component: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let timeout = config.timeout;
        Self {
            component: component.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: State::Closed,
                failure_count: 0,
                success_count: 0,
                current_timeout: timeout,
                opened_at_ms: 0,
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.inner.lock().unwrap().state
    }

    /// Runs `op` under the breaker's guard. Fails fast with
    /// `GuardError::Open` while OPEN and the timeout has not elapsed;
    /// otherwise runs `op` and records its outcome.
    pub async fn guard<F, Fut, T, E>(&self, op: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if let Some(retry_after) = self.pre_call_check() {
            return Err(GuardError::Open {
                component: self.component.clone(),
                retry_after,
            });
        }

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(GuardError::Inner(err))
            }
        }
    }

    /// Returns `Some(retry_after)` if the call should be blocked; otherwise
    /// transitions OPEN → HALF_OPEN when the timeout has elapsed and lets
    /// the call proceed.
    fn pre_call_check(&self) -> Option<Duration> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed | State::HalfOpen => None,
            State::Open => {
                let now_ms = self.clock.now_ms();
                let elapsed_ms = now_ms - inner.opened_at_ms;
                let timeout_ms = i64::try_from(inner.current_timeout.as_millis()).unwrap_or(i64::MAX);
                if elapsed_ms >= timeout_ms {
                    inner.state = State::HalfOpen;
                    inner.success_count = 0;
                    info!(component = %self.component, "circuit breaker half-open");
                    None
                } else {
                    Some(Duration::from_millis(u64::try_from(timeout_ms - elapsed_ms).unwrap_or(0)))
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => {
                inner.failure_count = 0;
                inner.current_timeout = self.config.timeout;
            }
            State::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = State::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.current_timeout = self.config.timeout;
                    info!(component = %self.component, "circuit breaker closed");
                }
            }
            State::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    // First trip: use the base timeout. Backoff escalates on
                    // repeated flapping (HALF_OPEN failing back to OPEN),
                    // not on the initial open — see spec §8 scenario 4.
                    self.open(&mut inner, false);
                }
            }
            State::HalfOpen => self.open(&mut inner, true),
            State::Open => {}
        }
    }

    fn open(&self, inner: &mut Inner, apply_backoff: bool) {
        inner.state = State::Open;
        inner.opened_at_ms = self.clock.now_ms();
        inner.success_count = 0;
        if apply_backoff && self.config.exponential_backoff {
            inner.current_timeout = (inner.current_timeout * 2).min(self.config.max_timeout);
        }
        warn!(component = %self.component, timeout = ?inner.current_timeout, "circuit breaker open");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketflow_core::clock::TestClock;

    fn breaker(clock: Arc<TestClock>) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 3,
                timeout: Duration::from_millis(500),
                success_threshold: 2,
                max_timeout: Duration::from_secs(300),
                exponential_backoff: true,
            },
            clock,
        )
    }

    async fn fail() -> Result<(), &'static str> {
        Err("boom")
    }

    async fn succeed() -> Result<(), &'static str> {
        Ok(())
    }

    /// Scenario 4 from spec §8: the full circuit-breaker cycle.
    #[tokio::test]
    async fn full_cycle_through_open_half_open_closed() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let cb = breaker(clock.clone());

        for _ in 0..3 {
            assert!(cb.guard(fail).await.is_err());
        }
        assert_eq!(cb.state(), State::Open);

        let fourth = cb.guard(succeed).await;
        assert!(matches!(fourth, Err(GuardError::Open { .. })));

        clock.advance(chrono::Duration::milliseconds(600));
        assert!(cb.guard(succeed).await.is_ok());
        assert_eq!(cb.state(), State::HalfOpen);

        assert!(cb.guard(succeed).await.is_ok());
        assert_eq!(cb.state(), State::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_with_backoff() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let cb = breaker(clock.clone());

        for _ in 0..3 {
            let _ = cb.guard(fail).await;
        }
        clock.advance(chrono::Duration::milliseconds(600));
        assert!(cb.guard(fail).await.is_err());
        assert_eq!(cb.state(), State::Open);

        // backoff doubled the timeout to 1000ms; 600ms is not enough this time.
        clock.advance(chrono::Duration::milliseconds(600));
        let blocked = cb.guard(succeed).await;
        assert!(matches!(blocked, Err(GuardError::Open { .. })));
    }

    #[tokio::test]
    async fn success_in_closed_resets_failure_count() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let cb = breaker(clock.clone());

        assert!(cb.guard(fail).await.is_err());
        assert!(cb.guard(fail).await.is_err());
        assert!(cb.guard(succeed).await.is_ok());
        assert!(cb.guard(fail).await.is_err());
        assert!(cb.guard(fail).await.is_err());
        // still only 2 consecutive failures since the success reset the counter
        assert_eq!(cb.state(), State::Closed);
    }
}
