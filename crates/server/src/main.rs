//! The MarketFlow binary (spec §5): wires the venue collectors, the bar
//! builder, the indicator orchestrator, the WS fan-out, and the
//! REST/WebSocket surface to a single in-process bus, then serves until
//! told to shut down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dashmap::DashMap;
use marketflow_alerts::{
    AlertEngine, InMemoryAlertRuleStore, LoggingEmailSender, NotificationSender, SlackSender, WebhookSender, WsSender,
};
use marketflow_collectors::{
    market_clock::MarketClock,
    polled_during_hours::build_polled_during_hours_collector,
    polled_rate_limited::build_polled_rate_limited_collector,
    streaming::build_streaming_collector,
    JsonRestDecoder, JsonStreamDecoder, RestPollSource, WsJsonSource,
};
use marketflow_core::clock::{Clock, SystemClock};
use marketflow_data::{BarBuilder, QualityChecker};
use marketflow_infrastructure::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use marketflow_infrastructure::{CacheClient, TimeseriesStore};
use marketflow_model::{AlertChannel, BusMessage, Symbol, Venue};
use marketflow_server::config::SymbolConfig;
use marketflow_server::{config, rest, AuthVerifier, DevAuthVerifier, HealthAggregator, IndicatorOrchestrator, SymbolCatalog, WsFanout};
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;

/// How long the shutdown path waits for in-flight bus messages and
/// collector disconnects to drain before the process exits anyway
/// (spec §5 "Cancellation").
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .init();

    let config_path = std::env::var("MARKETFLOW_CONFIG").unwrap_or_else(|_| "marketflow.toml".to_string());
    let config = config::load(&config_path).context("loading configuration")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(CacheClient::connect(&config.redis.url).await.context("connecting to redis")?);
    let store = Arc::new(
        TimeseriesStore::connect(&config.postgres.url, config.postgres.max_connections)
            .await
            .context("connecting to postgres")?,
    );

    let catalog = Arc::new(SymbolCatalog::new());
    for entry in &config.symbols {
        let symbol = Symbol {
            asset_class: entry.asset_class,
            symbol: entry.symbol.clone(),
            venue: entry.venue,
            display_name: entry.display_name.clone().unwrap_or_else(|| entry.symbol.clone()),
            is_active: true,
            metadata: HashMap::new(),
        };
        store.upsert_symbol(&symbol).await.context("seeding symbol into store")?;
        catalog.upsert(symbol);
    }

    let (bus_tx, bus_rx) = mpsc::unbounded_channel::<BusMessage>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health = Arc::new(HealthAggregator::new());
    let ws_fanout = WsFanout::new(Arc::clone(&clock), config.ws_throttle_interval(), config.ws_ring_cap);
    let auth: Arc<dyn AuthVerifier> = Arc::new(DevAuthVerifier);

    let http_client = reqwest::Client::builder()
        .timeout(config.notification_timeout())
        .build()
        .context("building notification HTTP client")?;

    let mut senders: HashMap<AlertChannel, Arc<dyn NotificationSender>> = HashMap::new();
    senders.insert(AlertChannel::Ws, Arc::new(WsSender::new(bus_tx.clone())));
    senders.insert(AlertChannel::Email, Arc::new(LoggingEmailSender));
    if let Some(url) = &config.notifications.webhook_url {
        senders.insert(AlertChannel::Webhook, Arc::new(WebhookSender::new(http_client.clone(), url.clone())));
    }
    if let Some(url) = &config.notifications.slack_webhook_url {
        senders.insert(AlertChannel::Slack, Arc::new(SlackSender::new(http_client.clone(), url.clone())));
    }

    let alert_rule_store = Arc::new(InMemoryAlertRuleStore::new());
    let alert_engine = Arc::new(AlertEngine::new(alert_rule_store, Arc::clone(&cache), Arc::clone(&clock), senders));

    let orchestrator = IndicatorOrchestrator::new(
        Arc::clone(&cache),
        Arc::clone(&store),
        Arc::clone(&alert_engine),
        Arc::clone(&clock),
        bus_tx.clone(),
        config.indicator_window,
    );

    let quality: Arc<DashMap<Venue, Arc<tokio::sync::Mutex<QualityChecker>>>> = Arc::new(DashMap::new());
    let mut collector_tasks = Vec::new();

    if let Some(handle) = spawn_streaming(&config, &clock, &bus_tx, &quality, shutdown_rx.clone()) {
        collector_tasks.push(handle);
    }
    if let Some(handle) = spawn_polled_during_hours(&config, &clock, &bus_tx, &quality, shutdown_rx.clone()) {
        collector_tasks.push(handle);
    }
    if let Some(handle) = spawn_polled_rate_limited(&config, &clock, &cache, &bus_tx, &quality, shutdown_rx.clone()) {
        collector_tasks.push(handle);
    }

    let flusher_handle = tokio::spawn(Arc::clone(&ws_fanout).run_flusher(config.ws_batch_window(), shutdown_rx.clone()));
    let dispatch_handle = tokio::spawn(run_bus_dispatch(
        bus_rx,
        Arc::clone(&store),
        Arc::clone(&cache),
        Arc::clone(&orchestrator),
        Arc::clone(&ws_fanout),
        Arc::clone(&health),
        shutdown_rx.clone(),
    ));

    let app_state = rest::AppState {
        catalog: Arc::clone(&catalog),
        cache: Arc::clone(&cache),
        store: Arc::clone(&store),
        ws_fanout: Arc::clone(&ws_fanout),
        health: Arc::clone(&health),
        auth,
        rate_limiter: Arc::new(marketflow_collectors::RateLimiter::new(
            Arc::clone(&cache),
            Arc::clone(&clock),
            120.0,
            120.0,
            60,
        )),
        rate_limit_capacity: 120.0,
        rate_limit_period_secs: 60,
        quality,
        clock: Arc::clone(&clock),
    };

    let router = rest::router(app_state).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await.context("binding http listener")?;
    tracing::info!(addr = %config.http_addr, "marketflow server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown_signal(shutdown_tx.clone()))
        .await
        .context("serving http")?;

    let _ = shutdown_tx.send(true);
    for handle in collector_tasks {
        let _ = tokio::time::timeout(SHUTDOWN_DRAIN, handle).await;
    }
    let _ = tokio::time::timeout(SHUTDOWN_DRAIN, flusher_handle).await;
    let _ = tokio::time::timeout(SHUTDOWN_DRAIN, dispatch_handle).await;

    Ok(())
}

/// Resolves once either a Ctrl-C or SIGTERM arrives, flipping the shared
/// shutdown flag so the collector run-loops and the bus dispatch task
/// start draining alongside the HTTP server.
async fn wait_for_shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);
}

fn symbols_for_venue(symbols: &[SymbolConfig], venue: Venue) -> Vec<String> {
    symbols.iter().filter(|s| s.venue == venue).map(|s| s.symbol.clone()).collect()
}

fn breaker_config(config: &config::MarketFlowConfig) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: config.circuit_breaker.failure_threshold,
        timeout: Duration::from_secs(config.circuit_breaker.open_timeout_secs),
        ..CircuitBreakerConfig::default()
    }
}

fn spawn_streaming(
    config: &config::MarketFlowConfig,
    clock: &Arc<dyn Clock>,
    bus_tx: &mpsc::UnboundedSender<BusMessage>,
    quality: &Arc<DashMap<Venue, Arc<tokio::sync::Mutex<QualityChecker>>>>,
    shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let url = config.venues.streaming_ws_url.clone()?;
    let symbols = symbols_for_venue(&config.symbols, Venue::CryptoStream);
    if symbols.is_empty() {
        return None;
    }

    let checker = Arc::new(tokio::sync::Mutex::new(QualityChecker::new(config.quality_sample_seed)));
    quality.insert(Venue::CryptoStream, Arc::clone(&checker));

    let breaker = Arc::new(CircuitBreaker::new("streaming", breaker_config(config), Arc::clone(clock)));
    let source = WsJsonSource::new(url, Box::new(JsonStreamDecoder::new(Venue::CryptoStream)));
    let mut runner =
        build_streaming_collector("streaming", source, symbols, breaker, checker, Arc::clone(clock), bus_tx.clone());

    Some(tokio::spawn(async move { runner.run(shutdown).await }))
}

fn spawn_polled_during_hours(
    config: &config::MarketFlowConfig,
    clock: &Arc<dyn Clock>,
    bus_tx: &mpsc::UnboundedSender<BusMessage>,
    quality: &Arc<DashMap<Venue, Arc<tokio::sync::Mutex<QualityChecker>>>>,
    shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let base_url = config.venues.polled_base_url.clone()?;
    let symbols = symbols_for_venue(&config.symbols, Venue::EquityPolled);
    if symbols.is_empty() {
        return None;
    }

    let checker = Arc::new(tokio::sync::Mutex::new(QualityChecker::new(config.quality_sample_seed)));
    quality.insert(Venue::EquityPolled, Arc::clone(&checker));

    let breaker = Arc::new(CircuitBreaker::new("polled-during-hours", breaker_config(config), Arc::clone(clock)));
    let source = RestPollSource::new(base_url, Box::new(JsonRestDecoder::new(Venue::EquityPolled)));
    let mut runner = build_polled_during_hours_collector(
        "polled-during-hours",
        source,
        symbols,
        breaker,
        checker,
        Arc::clone(clock),
        bus_tx.clone(),
        MarketClock::us_equity_regular_hours(),
    );

    Some(tokio::spawn(async move { runner.run(shutdown).await }))
}

fn spawn_polled_rate_limited(
    config: &config::MarketFlowConfig,
    clock: &Arc<dyn Clock>,
    cache: &Arc<CacheClient>,
    bus_tx: &mpsc::UnboundedSender<BusMessage>,
    quality: &Arc<DashMap<Venue, Arc<tokio::sync::Mutex<QualityChecker>>>>,
    shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let base_url = config.venues.rate_limited_base_url.clone()?;
    let symbols = symbols_for_venue(&config.symbols, Venue::EquityEod);
    if symbols.is_empty() {
        return None;
    }

    let checker = Arc::new(tokio::sync::Mutex::new(QualityChecker::new(config.quality_sample_seed)));
    quality.insert(Venue::EquityEod, Arc::clone(&checker));

    let breaker = Arc::new(CircuitBreaker::new("polled-rate-limited", breaker_config(config), Arc::clone(clock)));
    let source = RestPollSource::new(base_url, Box::new(JsonRestDecoder::new(Venue::EquityEod)));
    let mut runner = build_polled_rate_limited_collector(
        "polled-rate-limited",
        source,
        symbols,
        breaker,
        checker,
        Arc::clone(clock),
        bus_tx.clone(),
        Arc::clone(cache),
        "marketflow-server",
    );

    Some(tokio::spawn(async move { runner.run(shutdown).await }))
}

/// The central dispatch loop (spec §4.4 + §4.5 + §4.8): drives accepted
/// ticks through one shared [`BarBuilder`], persists and caches every
/// completion, forwards exchange-delivered bars and our own completions to
/// the indicator orchestrator, and routes chart updates, alerts, and health
/// reports to their respective sinks. Runs single-threaded by design — a
/// shared `BarBuilder` is only safe because exactly one task drives it.
#[allow(clippy::too_many_arguments)]
async fn run_bus_dispatch(
    mut bus_rx: mpsc::UnboundedReceiver<BusMessage>,
    store: Arc<TimeseriesStore>,
    cache: Arc<CacheClient>,
    orchestrator: Arc<IndicatorOrchestrator>,
    ws_fanout: Arc<WsFanout>,
    health: Arc<HealthAggregator>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut builder = BarBuilder::new();

    loop {
        tokio::select! {
            maybe_msg = bus_rx.recv() => {
                match maybe_msg {
                    Some(msg) => dispatch_one(msg, &mut builder, &store, &cache, &orchestrator, &ws_fanout, &health).await,
                    None => break,
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    // Graceful drain: keep processing whatever is already queued, bounded
    // by SHUTDOWN_DRAIN so a wedged sender can't hang the process forever.
    let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN;
    while let Ok(Some(msg)) = tokio::time::timeout_at(deadline, bus_rx.recv()).await {
        dispatch_one(msg, &mut builder, &store, &cache, &orchestrator, &ws_fanout, &health).await;
    }
}

async fn dispatch_one(
    msg: BusMessage,
    builder: &mut BarBuilder,
    store: &Arc<TimeseriesStore>,
    cache: &Arc<CacheClient>,
    orchestrator: &Arc<IndicatorOrchestrator>,
    ws_fanout: &Arc<WsFanout>,
    health: &Arc<HealthAggregator>,
) {
    match msg {
        BusMessage::Trade(trade_msg) => {
            let trade = trade_msg.trade;
            let venue = trade.venue;
            let symbol = trade.symbol.clone();
            let completions = builder.on_trade(&trade);

            for completion in &completions {
                if let Err(err) =
                    store.insert_candle(&completion.symbol, completion.venue, &completion.candle, completion.violation).await
                {
                    tracing::warn!(symbol = %completion.symbol, error = %err, "failed to persist completed candle");
                }
                cache.push_bar(&completion.symbol, completion.candle.timeframe, &completion.candle).await;
                orchestrator.submit(marketflow_model::BarCompleted {
                    symbol: completion.symbol.clone(),
                    venue: completion.venue,
                    candle: completion.candle,
                });
            }

            if let Some(open) = builder.current(&symbol, venue, marketflow_model::Timeframe::base()) {
                cache.set_current_bar(&symbol, open.timeframe, &open).await;
            }
        }
        BusMessage::BarCompleted(bar) => {
            orchestrator.submit(bar);
        }
        BusMessage::ChartUpdate(update) => {
            ws_fanout.handle_chart_update(&update);
        }
        BusMessage::Health(report) => {
            health.record(report);
        }
        BusMessage::Alert(alert) => {
            ws_fanout.handle_alert(&alert);
        }
    }
}
