//! Persistence seam for alert rules (spec §6 "CRUD for alerts"). Rule CRUD
//! over HTTP is out of scope for this build (see the server crate's REST
//! surface), but the engine itself is written against this trait so that
//! surface can land later without touching evaluation logic.

use async_trait::async_trait;
use marketflow_core::error::Result;
use marketflow_infrastructure::CacheClient;
use marketflow_model::AlertRule;
use uuid::Uuid;

/// Where [`crate::engine::AlertEngine`] loads and mutates rules. The engine
/// caches the active set per symbol (spec §4.7); this trait is the
/// source of truth behind that cache.
#[async_trait]
pub trait AlertRuleStore: Send + Sync {
    /// All active rules for `symbol`, in no particular order.
    async fn active_rules_for_symbol(&self, symbol: &str) -> Result<Vec<AlertRule>>;

    /// Persists a rule's post-evaluation state: `last_fired_at`,
    /// `fire_count`, `is_active` (flipped off by one-shot rules), and
    /// `metadata` (the MACD crossover's rolling `prev_macd`/`prev_signal`).
    async fn save_rule(&self, rule: &AlertRule) -> Result<()>;

    async fn rule_by_id(&self, id: Uuid) -> Result<Option<AlertRule>>;
}

/// An in-memory [`AlertRuleStore`] keyed by symbol, sufficient for the
/// engine to run end to end without a database-backed CRUD layer.
#[derive(Debug, Default)]
pub struct InMemoryAlertRuleStore {
    rules: dashmap::DashMap<String, Vec<AlertRule>>,
}

impl InMemoryAlertRuleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or replaces a symbol's rule set.
    pub fn insert(&self, symbol: impl Into<String>, rule: AlertRule) {
        self.rules.entry(symbol.into()).or_default().push(rule);
    }
}

#[async_trait]
impl AlertRuleStore for InMemoryAlertRuleStore {
    async fn active_rules_for_symbol(&self, symbol: &str) -> Result<Vec<AlertRule>> {
        Ok(self
            .rules
            .get(symbol)
            .map(|rules| rules.iter().filter(|r| r.is_active).cloned().collect())
            .unwrap_or_default())
    }

    async fn save_rule(&self, rule: &AlertRule) -> Result<()> {
        let mut bucket = self.rules.entry(rule.symbol.clone()).or_default();
        if let Some(slot) = bucket.iter_mut().find(|r| r.id == rule.id) {
            *slot = rule.clone();
        } else {
            bucket.push(rule.clone());
        }
        Ok(())
    }

    async fn rule_by_id(&self, id: Uuid) -> Result<Option<AlertRule>> {
        Ok(self.rules.iter().find_map(|entry| entry.value().iter().find(|r| r.id == id).cloned()))
    }
}

/// The rule cache seam (spec §4.7: "loads the set of active rules (cache
/// with 5 min TTL, invalidated on any mutation)"). Split out from
/// [`AlertRuleStore`] so tests can exercise evaluation logic without a
/// live Redis instance.
#[async_trait]
pub trait RuleCache: Send + Sync {
    async fn get(&self, symbol: &str) -> Option<Vec<AlertRule>>;
    async fn set(&self, symbol: &str, rules: &[AlertRule]);
    async fn invalidate(&self, symbol: &str);
}

#[async_trait]
impl RuleCache for CacheClient {
    async fn get(&self, symbol: &str) -> Option<Vec<AlertRule>> {
        self.get_alert_rules(symbol).await
    }

    async fn set(&self, symbol: &str, rules: &[AlertRule]) {
        self.set_alert_rules(symbol, rules).await;
    }

    async fn invalidate(&self, symbol: &str) {
        self.invalidate_alert_rules(symbol).await;
    }
}

/// A [`RuleCache`] that never caches, used in tests that don't stand up
/// Redis.
#[derive(Debug, Default)]
pub struct NoopRuleCache;

#[async_trait]
impl RuleCache for NoopRuleCache {
    async fn get(&self, _symbol: &str) -> Option<Vec<AlertRule>> {
        None
    }

    async fn set(&self, _symbol: &str, _rules: &[AlertRule]) {}

    async fn invalidate(&self, _symbol: &str) {}
}
