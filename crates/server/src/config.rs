//! Startup configuration (SPEC_FULL §B "Configuration"): a TOML file plus
//! environment overrides, loaded once. Hot-reload and alert-rule CRUD are
//! out of scope (spec §1 Non-goals); this is a one-shot load.

use std::time::Duration;

use marketflow_core::error::{MarketFlowError, Result};
use marketflow_model::{AssetClass, Venue};
use serde::Deserialize;

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_indicator_window() -> usize {
    200
}

fn default_throttle_interval_ms() -> u64 {
    1_000
}

fn default_batch_window_ms() -> u64 {
    100
}

fn default_ring_cap() -> usize {
    100
}

fn default_notification_timeout_secs() -> u64 {
    10
}

fn default_quality_seed() -> u64 {
    42
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerDefaults {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_timeout_secs() -> u64 {
    30
}

impl Default for CircuitBreakerDefaults {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_timeout_secs: default_open_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolConfig {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub venue: Venue,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VenueEndpoints {
    #[serde(default)]
    pub streaming_ws_url: Option<String>,
    #[serde(default)]
    pub polled_base_url: Option<String>,
    #[serde(default)]
    pub rate_limited_base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
}

/// Top-level configuration, loaded from a TOML file and overridden by
/// `MARKETFLOW_*` environment variables (see [`load`]).
#[derive(Debug, Clone, Deserialize)]
pub struct MarketFlowConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    pub redis: RedisConfig,
    pub postgres: PostgresConfig,
    #[serde(default = "default_indicator_window")]
    pub indicator_window: usize,
    #[serde(default = "default_throttle_interval_ms")]
    pub ws_throttle_interval_ms: u64,
    #[serde(default = "default_batch_window_ms")]
    pub ws_batch_window_ms: u64,
    #[serde(default = "default_ring_cap")]
    pub ws_ring_cap: usize,
    #[serde(default = "default_notification_timeout_secs")]
    pub notification_timeout_secs: u64,
    #[serde(default = "default_quality_seed")]
    pub quality_sample_seed: u64,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerDefaults,
    #[serde(default)]
    pub symbols: Vec<SymbolConfig>,
    #[serde(default)]
    pub venues: VenueEndpoints,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl MarketFlowConfig {
    #[must_use]
    pub fn ws_throttle_interval(&self) -> Duration {
        Duration::from_millis(self.ws_throttle_interval_ms)
    }

    #[must_use]
    pub fn ws_batch_window(&self) -> Duration {
        Duration::from_millis(self.ws_batch_window_ms)
    }

    #[must_use]
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }
}

/// Loads configuration from `path` (TOML), then applies a handful of
/// environment overrides for the secrets/DSNs operators don't want sitting
/// in a file: `MARKETFLOW_REDIS_URL`, `MARKETFLOW_POSTGRES_URL`,
/// `MARKETFLOW_HTTP_ADDR`.
pub fn load(path: &str) -> Result<MarketFlowConfig> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        MarketFlowError::Config(format!("failed to read config file {path}: {err}"))
    })?;
    let mut config: MarketFlowConfig =
        toml::from_str(&raw).map_err(|err| MarketFlowError::Config(format!("invalid config: {err}")))?;

    if let Ok(url) = std::env::var("MARKETFLOW_REDIS_URL") {
        config.redis.url = url;
    }
    if let Ok(url) = std::env::var("MARKETFLOW_POSTGRES_URL") {
        config.postgres.url = url;
    }
    if let Ok(addr) = std::env::var("MARKETFLOW_HTTP_ADDR") {
        config.http_addr = addr;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml_with_defaults() {
        let toml = r#"
            [redis]
            url = "redis://127.0.0.1:6379"

            [postgres]
            url = "postgres://localhost/marketflow"
        "#;
        let config: MarketFlowConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.http_addr, "0.0.0.0:8080");
        assert_eq!(config.indicator_window, 200);
        assert_eq!(config.ws_ring_cap, 100);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }
}
