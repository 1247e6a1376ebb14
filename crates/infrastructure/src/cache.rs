//! Redis-backed hot cache (spec §6 cache keys, §4.9 rate-limit buckets).
//!
//! Every method fails open per spec §7 ("Cache unavailable. Reads miss,
//! writes no-op."): a Redis error is logged and absorbed rather than
//! propagated, except for the handful of callers (the rate limiter) that
//! need to distinguish "no bucket yet" from "cache down" — those use
//! [`CacheClient::get_rate_limit_bucket`] directly and handle `Err` as
//! fail-open themselves.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use marketflow_model::{AlertRule, Candle, FeatureRow, IndicatorRow, Timeframe};

const REDIS_DELIMITER: char = ':';
const BARS_RING_CAP: isize = 1000;
const INDICATOR_TTL_SECS: u64 = 300;
const FEATURE_TTL_SECS: u64 = 300;
const ALERT_RULES_TTL_SECS: u64 = 300;

fn bars_key(symbol: &str, tf: Timeframe) -> String {
    format!("bars{REDIS_DELIMITER}{symbol}{REDIS_DELIMITER}{}", tf.code())
}

fn current_bar_key(symbol: &str, tf: Timeframe) -> String {
    format!("current_bar{REDIS_DELIMITER}{symbol}{REDIS_DELIMITER}{}", tf.code())
}

fn indicators_key(symbol: &str, tf: Timeframe) -> String {
    format!("indicators{REDIS_DELIMITER}{symbol}{REDIS_DELIMITER}{}", tf.code())
}

fn features_key(symbol: &str) -> String {
    format!("features{REDIS_DELIMITER}{symbol}{REDIS_DELIMITER}latest")
}

fn rate_limit_key(client_id: &str) -> String {
    format!("rate_limit{REDIS_DELIMITER}{client_id}")
}

fn alert_rules_key(symbol: &str) -> String {
    format!("alert_rules{REDIS_DELIMITER}{symbol}")
}

/// A thin async wrapper over a Redis [`ConnectionManager`], keyed the way
/// spec §6 specifies.
#[derive(Clone)]
pub struct CacheClient {
    conn: ConnectionManager,
}

impl CacheClient {
    /// Connects to `redis_url`, e.g. `redis://127.0.0.1:6379`.
    pub async fn connect(redis_url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Appends a completed candle to `bars:{symbol}:{tf}`, a sorted set
    /// scored by bucket timestamp, trimmed to the most recent 1000 entries.
    pub async fn push_bar(&self, symbol: &str, tf: Timeframe, candle: &Candle) {
        let key = bars_key(symbol, tf);
        let mut conn = self.conn.clone();
        let payload = match serde_json::to_string(candle) {
            Ok(json) => json,
            Err(err) => {
                warn!(%key, error = %err, "failed to serialize candle for cache");
                return;
            }
        };
        let result: redis::RedisResult<()> = async {
            conn.zadd(&key, payload, candle.ts_bucket).await?;
            conn.zremrangebyrank(&key, 0, -(BARS_RING_CAP + 1)).await?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            warn!(%key, error = %err, "cache write failed, continuing without it");
        }
    }

    /// The last `limit` completed candles for `(symbol, tf)`, newest last.
    #[must_use = "callers should fall back to storage on an empty result"]
    pub async fn recent_bars(&self, symbol: &str, tf: Timeframe, limit: isize) -> Vec<Candle> {
        let key = bars_key(symbol, tf);
        let mut conn = self.conn.clone();
        let raw: redis::RedisResult<Vec<String>> = conn.zrange(&key, -limit, -1).await;
        match raw {
            Ok(entries) => entries
                .iter()
                .filter_map(|json| serde_json::from_str(json).ok())
                .collect(),
            Err(err) => {
                warn!(%key, error = %err, "cache read failed, returning empty (fail open)");
                Vec::new()
            }
        }
    }

    /// Caches the still-open candle under a short TTL (one bucket period).
    pub async fn set_current_bar(&self, symbol: &str, tf: Timeframe, candle: &Candle) {
        let key = current_bar_key(symbol, tf);
        let ttl_secs = u64::try_from(tf.period_ms() / 1000).unwrap_or(60).max(1);
        let mut conn = self.conn.clone();
        let Ok(payload) = serde_json::to_string(candle) else {
            return;
        };
        if let Err(err) = conn.set_ex::<_, _, ()>(&key, payload, ttl_secs).await {
            warn!(%key, error = %err, "cache write failed, continuing without it");
        }
    }

    /// Caches an indicator row with a 300 s TTL (spec §6).
    pub async fn set_indicators(&self, symbol: &str, tf: Timeframe, row: &IndicatorRow) {
        let key = indicators_key(symbol, tf);
        let mut conn = self.conn.clone();
        let Ok(payload) = serde_json::to_string(row) else {
            return;
        };
        if let Err(err) = conn.set_ex::<_, _, ()>(&key, payload, INDICATOR_TTL_SECS).await {
            warn!(%key, error = %err, "cache write failed, continuing without it");
        }
    }

    pub async fn get_indicators(&self, symbol: &str, tf: Timeframe) -> Option<IndicatorRow> {
        let key = indicators_key(symbol, tf);
        let mut conn = self.conn.clone();
        let raw: redis::RedisResult<Option<String>> = conn.get(&key).await;
        match raw {
            Ok(Some(json)) => serde_json::from_str(&json).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(%key, error = %err, "cache read failed, returning None (fail open)");
                None
            }
        }
    }

    /// Caches the latest feature row with a 300 s TTL (spec §6).
    pub async fn set_features_latest(&self, symbol: &str, row: &FeatureRow) {
        let key = features_key(symbol);
        let mut conn = self.conn.clone();
        let Ok(payload) = serde_json::to_string(row) else {
            return;
        };
        if let Err(err) = conn.set_ex::<_, _, ()>(&key, payload, FEATURE_TTL_SECS).await {
            warn!(%key, error = %err, "cache write failed, continuing without it");
        }
    }

    pub async fn get_features_latest(&self, symbol: &str) -> Option<FeatureRow> {
        let key = features_key(symbol);
        let mut conn = self.conn.clone();
        let raw: redis::RedisResult<Option<String>> = conn.get(&key).await;
        match raw {
            Ok(Some(json)) => serde_json::from_str(&json).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(%key, error = %err, "cache read failed, returning None (fail open)");
                None
            }
        }
    }

    /// Reads the raw `(tokens, last_refill_ms)` pair backing a token-bucket
    /// rate limiter (spec §4.9). Callers own the fail-open decision since a
    /// cache miss here means "allow" rather than "nothing cached yet" —
    /// those are the same outcome for this key, but distinguishing a
    /// genuine error is useful for logging at the call site.
    pub async fn get_rate_limit_bucket(&self, client_id: &str) -> redis::RedisResult<Option<(f64, i64)>> {
        let key = rate_limit_key(client_id);
        let mut conn = self.conn.clone();
        let fields: Option<(f64, i64)> = conn.hget(&key, ("tokens", "last_refill_ms")).await?;
        Ok(fields)
    }

    /// Persists the token-bucket state with a TTL of twice the refill
    /// period (spec §6).
    pub async fn set_rate_limit_bucket(
        &self,
        client_id: &str,
        tokens: f64,
        last_refill_ms: i64,
        period_secs: u64,
    ) -> redis::RedisResult<()> {
        let key = rate_limit_key(client_id);
        let mut conn = self.conn.clone();
        conn.hset_multiple::<_, _, _, ()>(
            &key,
            &[("tokens", tokens.to_string()), ("last_refill_ms", last_refill_ms.to_string())],
        )
        .await?;
        conn.expire::<_, ()>(&key, i64::try_from(period_secs * 2).unwrap_or(i64::MAX))
            .await
    }

    /// Caches the active rule set for `symbol` with a 5 min TTL (spec §4.7).
    pub async fn set_alert_rules(&self, symbol: &str, rules: &[AlertRule]) {
        let key = alert_rules_key(symbol);
        let mut conn = self.conn.clone();
        let Ok(payload) = serde_json::to_string(rules) else {
            return;
        };
        if let Err(err) = conn.set_ex::<_, _, ()>(&key, payload, ALERT_RULES_TTL_SECS).await {
            warn!(%key, error = %err, "cache write failed, continuing without it");
        }
    }

    pub async fn get_alert_rules(&self, symbol: &str) -> Option<Vec<AlertRule>> {
        let key = alert_rules_key(symbol);
        let mut conn = self.conn.clone();
        let raw: redis::RedisResult<Option<String>> = conn.get(&key).await;
        match raw {
            Ok(Some(json)) => serde_json::from_str(&json).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(%key, error = %err, "cache read failed, returning None (fail open)");
                None
            }
        }
    }

    /// Evicts the cached rule set for `symbol`, forcing the next lookup to
    /// reload from the rule store (spec §4.7: "invalidated on any mutation").
    pub async fn invalidate_alert_rules(&self, symbol: &str) {
        let key = alert_rules_key(symbol);
        let mut conn = self.conn.clone();
        if let Err(err) = conn.del::<_, ()>(&key).await {
            warn!(%key, error = %err, "cache invalidation failed, stale entry may serve until TTL");
        }
    }
}
