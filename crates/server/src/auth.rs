//! Authentication seam (spec §6 "Bearer token in query", §7 "Auth
//! failures (WS): Close with code 4001. (REST) 401."). JWT/session
//! internals are an explicit Non-goal (SPEC_FULL §D); this crate only
//! defines the trait the WS/REST layers call through.

use async_trait::async_trait;

/// The identity recovered from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
}

#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Verifies `token`, returning the caller's identity or `None` if it
    /// doesn't check out. No token format, issuer, or claim schema is
    /// prescribed here — a real deployment swaps in whatever the
    /// authentication provider requires.
    async fn verify(&self, token: &str) -> Option<Identity>;
}

/// An [`AuthVerifier`] that accepts any non-empty token as its own user
/// name, for local development and the end-to-end tests in spec §8. Not
/// suitable for anything that isn't a closed development loop.
#[derive(Debug, Default)]
pub struct DevAuthVerifier;

#[async_trait]
impl AuthVerifier for DevAuthVerifier {
    async fn verify(&self, token: &str) -> Option<Identity> {
        if token.is_empty() {
            None
        } else {
            Some(Identity { user: token.to_string() })
        }
    }
}
