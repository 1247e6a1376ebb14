//! REST + WebSocket surface (spec §6).
//!
//! Handlers are thin: they translate HTTP/WS framing into calls against the
//! cache/store/registries built up in `main`, the same "handlers own no
//! state of their own" shape the teacher's adapter servers use.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use marketflow_collectors::{Decision, RateLimiter};
use marketflow_core::clock::Clock;
use marketflow_data::QualityChecker;
use marketflow_infrastructure::{CacheClient, TimeseriesStore};
use marketflow_model::{Timeframe, Venue};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::auth::AuthVerifier;
use crate::catalog::SymbolCatalog;
use crate::health::HealthAggregator;
use crate::ws_fanout::{initial_frame, frame_pong, WsFanout};

/// Shared state every handler is given a clone of.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<SymbolCatalog>,
    pub cache: Arc<CacheClient>,
    pub store: Arc<TimeseriesStore>,
    pub ws_fanout: Arc<WsFanout>,
    pub health: Arc<HealthAggregator>,
    pub auth: Arc<dyn AuthVerifier>,
    pub rate_limiter: Arc<RateLimiter>,
    pub rate_limit_capacity: f64,
    pub rate_limit_period_secs: u64,
    /// Live quality checkers, shared with the collector that owns each
    /// venue's rolling state (one `QualityChecker` serves every symbol a
    /// given venue's collector handles).
    pub quality: Arc<DashMap<Venue, Arc<tokio::sync::Mutex<QualityChecker>>>>,
    pub clock: Arc<dyn Clock>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/symbols", get(get_symbols))
        .route("/charts/:symbol", get(get_chart))
        .route("/features/:symbol", get(get_features))
        .route("/quality/:symbol", get(get_quality))
        .route("/alerts", get(alerts_not_implemented).post(alerts_not_implemented))
        .route("/alerts/:id", get(alerts_not_implemented).put(alerts_not_implemented).delete(alerts_not_implemented))
        .route("/health", get(get_health))
        .route("/ws/:symbol", get(ws_upgrade))
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_layer))
        .with_state(state)
}

/// Client identifier the rate limiter buckets on. No API-key scheme is in
/// scope (SPEC_FULL §D); this falls back through a client header to the
/// peer address so local development and the literal §8 scenarios still
/// exercise the limiter.
fn client_id(headers: &HeaderMap) -> String {
    headers
        .get("x-client-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| "anonymous".to_string())
}

async fn rate_limit_layer(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let id = client_id(request.headers());
    match state.rate_limiter.allow(&id, 1.0).await {
        Decision::Allow => {
            let mut response = next.run(request).await;
            let remaining = state
                .cache
                .get_rate_limit_bucket(&id)
                .await
                .ok()
                .flatten()
                .map_or(state.rate_limit_capacity, |(tokens, _)| tokens);
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(state.rate_limit_capacity as u64));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining as u64));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(state.rate_limit_period_secs));
            response
        }
        Decision::Deny { retry_after_secs } => {
            let mut headers = HeaderMap::new();
            headers.insert("Retry-After", HeaderValue::from(retry_after_secs));
            headers.insert("X-RateLimit-Limit", HeaderValue::from(state.rate_limit_capacity as u64));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u64));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(retry_after_secs));
            (StatusCode::TOO_MANY_REQUESTS, headers, "rate limit exceeded").into_response()
        }
    }
}

async fn get_symbols(State(state): State<AppState>) -> Json<HashMap<String, Vec<marketflow_model::Symbol>>> {
    Json(state.catalog.grouped_by_venue())
}

#[derive(Debug, serde::Deserialize)]
struct ChartQuery {
    timeframe: Option<String>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ChartResponse {
    symbol: String,
    timeframe: String,
    bars: Vec<marketflow_model::Candle>,
    indicators: Option<marketflow_model::IndicatorRow>,
}

async fn get_chart(State(state): State<AppState>, Path(symbol): Path<String>, Query(q): Query<ChartQuery>) -> Response {
    let Some(tf) = q.timeframe.as_deref().and_then(Timeframe::parse).or(Some(Timeframe::base())) else {
        return (StatusCode::BAD_REQUEST, "unknown timeframe").into_response();
    };
    let limit = q.limit.unwrap_or(200).clamp(1, 1000);

    let mut bars = state.cache.recent_bars(&symbol, tf, limit as isize).await;
    if bars.len() < limit as usize {
        match state.store.load_recent_candles(&symbol, tf, limit).await {
            Ok(rows) if rows.len() > bars.len() => bars = rows,
            Ok(_) => {}
            Err(err) => warn!(%symbol, %tf, error = %err, "store unavailable for chart backfill"),
        }
    }
    let indicators = state.cache.get_indicators(&symbol, tf).await;

    Json(ChartResponse { symbol, timeframe: tf.code().to_string(), bars, indicators }).into_response()
}

#[derive(Debug, serde::Deserialize)]
struct FeaturesQuery {
    mode: Option<String>,
    timeframe: Option<String>,
    start: Option<i64>,
    end: Option<i64>,
}

async fn get_features(State(state): State<AppState>, Path(symbol): Path<String>, Query(q): Query<FeaturesQuery>) -> Response {
    let tf = q.timeframe.as_deref().and_then(Timeframe::parse).unwrap_or(Timeframe::base());
    match q.mode.as_deref() {
        Some("batch") => {
            let (Some(start), Some(end)) = (q.start, q.end) else {
                return (StatusCode::BAD_REQUEST, "batch mode requires start and end").into_response();
            };
            match state.store.load_feature_range(&symbol, tf, start, end).await {
                Ok(rows) => Json(rows).into_response(),
                Err(err) => {
                    warn!(%symbol, error = %err, "feature range query failed");
                    (StatusCode::SERVICE_UNAVAILABLE, "store unavailable").into_response()
                }
            }
        }
        _ => match state.cache.get_features_latest(&symbol).await {
            Some(row) => Json(row).into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
    }
}

#[derive(Debug, serde::Deserialize)]
struct QualityQuery {
    hours: Option<i64>,
}

#[derive(Debug, Serialize)]
struct QualityResponse {
    symbol: String,
    current_score: Option<f64>,
    minute_buckets: Vec<QualityBucket>,
    recent_failures: Vec<QuarantineView>,
}

#[derive(Debug, Serialize)]
struct QualityBucket {
    minute_bucket: chrono::DateTime<Utc>,
    accepted: i64,
    rejected: i64,
    quality_score: f64,
}

#[derive(Debug, Serialize)]
struct QuarantineView {
    ts_ms: i64,
    check: String,
    reason: String,
    quality_score: f64,
}

async fn get_quality(State(state): State<AppState>, Path(symbol): Path<String>, Query(q): Query<QualityQuery>) -> Response {
    let hours = q.hours.unwrap_or(24).clamp(1, 24 * 30);
    let since = state.clock.now() - chrono::Duration::hours(hours);

    let minute_buckets = match state.store.load_quality_metrics(&symbol, since).await {
        Ok(rows) => rows
            .into_iter()
            .map(|(minute_bucket, accepted, rejected, quality_score)| QualityBucket {
                minute_bucket,
                accepted,
                rejected,
                quality_score,
            })
            .collect(),
        Err(err) => {
            warn!(%symbol, error = %err, "quality metrics query failed");
            Vec::new()
        }
    };

    let venue = state.catalog.find_by_symbol(&symbol).map(|s| s.venue);
    let checker = venue.and_then(|venue| state.quality.get(&venue).map(|entry| entry.value().clone()));
    let (current_score, recent_failures) = match checker {
        Some(checker) => {
            let checker = checker.lock().await;
            let score = checker.quality_score(&symbol);
            let failures = checker
                .recent_quarantine(&symbol)
                .iter()
                .map(|entry| QuarantineView {
                    ts_ms: entry.ts_ms,
                    check: format!("{:?}", entry.check),
                    reason: entry.reason.clone(),
                    quality_score: entry.quality_score,
                })
                .collect();
            (score, failures)
        }
        None => (None, Vec::new()),
    };

    Json(QualityResponse { symbol, current_score, minute_buckets, recent_failures }).into_response()
}

/// REST CRUD for alert rules is an explicit non-goal (SPEC_FULL §D): the
/// `AlertRuleStore` trait is defined for a future implementation to plug
/// into, but no handler backs it yet.
async fn alerts_not_implemented() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    components: HashMap<String, marketflow_model::HealthReport>,
}

async fn get_health(State(state): State<AppState>) -> Response {
    let overall = state.health.overall();
    let status = match overall {
        crate::health::OverallStatus::Healthy => "healthy",
        crate::health::OverallStatus::Degraded => "degraded",
        crate::health::OverallStatus::Unhealthy => "unhealthy",
    };
    let body = HealthResponse { status, components: state.health.snapshot() };
    (StatusCode::from_u16(overall.http_status()).expect("valid status code"), Json(body)).into_response()
}

#[derive(Debug, serde::Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(q): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, symbol, q.token.unwrap_or_default(), state))
}

async fn handle_socket(mut socket: WebSocket, symbol: String, token: String, state: AppState) {
    let Some(identity) = state.auth.verify(&token).await else {
        let _ = socket
            .send(Message::Close(Some(CloseFrame { code: 4001, reason: "unauthorized".into() })))
            .await;
        return;
    };

    let tf = Timeframe::base();
    let mut bars = state.cache.recent_bars(&symbol, tf, 200).await;
    if bars.is_empty() {
        if let Ok(rows) = state.store.load_recent_candles(&symbol, tf, 200).await {
            bars = rows;
        }
    }
    let indicators = state.cache.get_indicators(&symbol, tf).await;

    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<Message>();
    let conn_id = state.ws_fanout.register(&symbol, identity.user.clone(), outbox_tx);

    let (mut sink, mut stream) = socket.split();
    if sink.send(Message::Text(initial_frame(&bars, indicators.as_ref()).to_string().into())).await.is_err() {
        state.ws_fanout.unregister(&symbol, conn_id);
        return;
    }

    let forward = tokio::spawn(async move {
        while let Some(msg) = outbox_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
                    if value.get("type").and_then(|t| t.as_str()) == Some("ping") {
                        let _ = state
                            .ws_fanout
                            .send_direct(&symbol, conn_id, Message::Text(frame_pong().to_string().into()));
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    forward.abort();
    state.ws_fanout.unregister(&symbol, conn_id);
}
