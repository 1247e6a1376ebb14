//! Postgres-backed time-series store (spec §6 persisted schema).
//!
//! Every write is an upsert (`ON CONFLICT ... DO UPDATE` or `DO NOTHING`)
//! keyed on the natural primary key of the row, matching spec §7's
//! "re-processing a tick never creates a duplicate row" requirement.

use chrono::{DateTime, Utc};
use marketflow_core::error::{MarketFlowError, Result};
use marketflow_model::{Candle, IndicatorRow, OhlcViolation, Symbol, Timeframe, Venue};
use sqlx::postgres::{PgPool, PgPoolOptions};

fn store_err(context: &str, err: sqlx::Error) -> MarketFlowError {
    MarketFlowError::Store(format!("{context}: {err}"))
}

/// A connection pool plus the queries MarketFlow issues against it.
#[derive(Clone)]
pub struct TimeseriesStore {
    pool: PgPool,
}

impl TimeseriesStore {
    /// Connects with a bounded pool, matching the teacher's pattern of
    /// capping max connections rather than leaving the default unbounded.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| store_err("connect", e))?;
        Ok(Self { pool })
    }

    pub async fn upsert_symbol(&self, symbol: &Symbol) -> Result<()> {
        sqlx::query(
            "INSERT INTO symbols (symbol, asset_class, venue, active)
             VALUES ($1, $2, $3, true)
             ON CONFLICT (symbol, venue) DO UPDATE SET asset_class = EXCLUDED.asset_class, active = true",
        )
        .bind(&symbol.symbol)
        .bind(symbol.asset_class.to_string())
        .bind(symbol.venue.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("upsert_symbol", e))?;
        Ok(())
    }

    /// Persists a completed candle. `violation` is recorded alongside the
    /// row rather than rejecting the write — spec §7 treats OHLC anomalies
    /// as data, not faults.
    pub async fn insert_candle(
        &self,
        symbol: &str,
        venue: Venue,
        candle: &Candle,
        violation: Option<OhlcViolation>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO candles
                (symbol, venue, timeframe, ts_bucket, open, high, low, close, volume,
                 trade_count, completed, violation)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (symbol, venue, timeframe, ts_bucket) DO UPDATE SET
                open = EXCLUDED.open,
                high = EXCLUDED.high,
                low = EXCLUDED.low,
                close = EXCLUDED.close,
                volume = EXCLUDED.volume,
                trade_count = EXCLUDED.trade_count,
                completed = EXCLUDED.completed,
                violation = EXCLUDED.violation",
        )
        .bind(symbol)
        .bind(venue.to_string())
        .bind(candle.timeframe.code())
        .bind(candle.ts_bucket)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(candle.volume)
        .bind(i64::try_from(candle.trade_count).unwrap_or(i64::MAX))
        .bind(candle.completed)
        .bind(violation.map(|v| format!("{v:?}")))
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("insert_candle", e))?;
        Ok(())
    }

    pub async fn insert_indicators(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        ts_bucket: i64,
        row: &IndicatorRow,
    ) -> Result<()> {
        let payload = serde_json::to_value(row)
            .map_err(|e| MarketFlowError::Store(format!("serialize indicators: {e}")))?;
        sqlx::query(
            "INSERT INTO indicators (symbol, timeframe, ts_bucket, payload)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (symbol, timeframe, ts_bucket) DO UPDATE SET payload = EXCLUDED.payload",
        )
        .bind(symbol)
        .bind(timeframe.code())
        .bind(ts_bucket)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("insert_indicators", e))?;
        Ok(())
    }

    pub async fn insert_ml_features(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        ts_bucket: i64,
        feature_version: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO ml_features (symbol, timeframe, ts_bucket, feature_version, payload)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (symbol, timeframe, ts_bucket, feature_version) DO UPDATE SET payload = EXCLUDED.payload",
        )
        .bind(symbol)
        .bind(timeframe.code())
        .bind(ts_bucket)
        .bind(feature_version)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("insert_ml_features", e))?;
        Ok(())
    }

    /// Rolls up a quality-check pass/fail tally for one minute of traffic
    /// into `data_quality_metrics` (spec §6's minute-bucketed aggregate,
    /// distinct from the per-tick quarantine ring kept in memory).
    pub async fn record_quality_metrics(
        &self,
        symbol: &str,
        minute_bucket: DateTime<Utc>,
        accepted: u64,
        rejected: u64,
        quality_score: f64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO data_quality_metrics
                (symbol, minute_bucket, accepted, rejected, quality_score)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (symbol, minute_bucket) DO UPDATE SET
                accepted = EXCLUDED.accepted,
                rejected = EXCLUDED.rejected,
                quality_score = EXCLUDED.quality_score",
        )
        .bind(symbol)
        .bind(minute_bucket)
        .bind(i64::try_from(accepted).unwrap_or(i64::MAX))
        .bind(i64::try_from(rejected).unwrap_or(i64::MAX))
        .bind(quality_score)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("record_quality_metrics", e))?;
        Ok(())
    }

    pub async fn insert_alert(
        &self,
        rule_name: &str,
        symbol: &str,
        fired_at: DateTime<Utc>,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO alerts (rule_name, symbol, fired_at, message) VALUES ($1, $2, $3, $4)",
        )
        .bind(rule_name)
        .bind(symbol)
        .bind(fired_at)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("insert_alert", e))?;
        Ok(())
    }

    /// The most recent `limit` candles for `symbol`/`timeframe`, oldest
    /// first, for `GET /charts/{symbol}` (spec §6).
    pub async fn load_recent_candles(&self, symbol: &str, timeframe: Timeframe, limit: i64) -> Result<Vec<Candle>> {
        let rows: Vec<(i64, f64, f64, f64, f64, f64, i64, bool)> = sqlx::query_as(
            "SELECT ts_bucket, open, high, low, close, volume, trade_count, completed
             FROM candles
             WHERE symbol = $1 AND timeframe = $2
             ORDER BY ts_bucket DESC
             LIMIT $3",
        )
        .bind(symbol)
        .bind(timeframe.code())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("load_recent_candles", e))?;

        let mut candles: Vec<Candle> = rows
            .into_iter()
            .map(
                |(ts_bucket, open, high, low, close, volume, trade_count, completed)| Candle {
                    ts_bucket,
                    timeframe,
                    open,
                    high,
                    low,
                    close,
                    volume,
                    trade_count: u64::try_from(trade_count).unwrap_or(0),
                    completed,
                },
            )
            .collect();
        candles.reverse();
        Ok(candles)
    }

    /// Feature rows for `symbol`/`timeframe` between `start` and `end`
    /// (inclusive), oldest first, for `GET /features/{symbol}?mode=batch`.
    pub async fn load_feature_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_ts_bucket: i64,
        end_ts_bucket: i64,
    ) -> Result<Vec<serde_json::Value>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT payload FROM ml_features
             WHERE symbol = $1 AND timeframe = $2 AND ts_bucket BETWEEN $3 AND $4
             ORDER BY ts_bucket ASC",
        )
        .bind(symbol)
        .bind(timeframe.code())
        .bind(start_ts_bucket)
        .bind(end_ts_bucket)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("load_feature_range", e))?;
        Ok(rows.into_iter().map(|(payload,)| payload).collect())
    }

    /// Minute-bucketed quality tallies for `symbol` over the trailing
    /// `hours`, for `GET /quality/{symbol}` (spec §6).
    pub async fn load_quality_metrics(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, i64, i64, f64)>> {
        sqlx::query_as(
            "SELECT minute_bucket, accepted, rejected, quality_score
             FROM data_quality_metrics
             WHERE symbol = $1 AND minute_bucket >= $2
             ORDER BY minute_bucket ASC",
        )
        .bind(symbol)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("load_quality_metrics", e))
    }

    /// Historical candles for backfilling a roll-up or feature window,
    /// oldest first.
    pub async fn load_candles(
        &self,
        symbol: &str,
        venue: Venue,
        timeframe: Timeframe,
        since_ts_bucket: i64,
        limit: i64,
    ) -> Result<Vec<Candle>> {
        let rows: Vec<(i64, f64, f64, f64, f64, f64, i64, bool)> = sqlx::query_as(
            "SELECT ts_bucket, open, high, low, close, volume, trade_count, completed
             FROM candles
             WHERE symbol = $1 AND venue = $2 AND timeframe = $3 AND ts_bucket >= $4
             ORDER BY ts_bucket ASC
             LIMIT $5",
        )
        .bind(symbol)
        .bind(venue.to_string())
        .bind(timeframe.code())
        .bind(since_ts_bucket)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("load_candles", e))?;

        Ok(rows
            .into_iter()
            .map(
                |(ts_bucket, open, high, low, close, volume, trade_count, completed)| Candle {
                    ts_bucket,
                    timeframe,
                    open,
                    high,
                    low,
                    close,
                    volume,
                    trade_count: u64::try_from(trade_count).unwrap_or(0),
                    completed,
                },
            )
            .collect())
    }
}
