//! WS Fan-Out (spec §4.8): a per-symbol connection registry, throttled
//! immediate sends, and a background flusher that drains each client's
//! bounded ring on a fixed cadence.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use dashmap::DashMap;
use marketflow_core::clock::Clock;
use marketflow_model::{AlertFired, Candle, ChartUpdate, IndicatorRow};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

fn frame_initial(bars: &[Candle], indicators: Option<&IndicatorRow>) -> serde_json::Value {
    serde_json::json!({"type": "initial", "bars": bars, "indicators": indicators})
}

fn frame_update(update: &ChartUpdate) -> serde_json::Value {
    serde_json::json!({
        "type": "update",
        "symbol": update.symbol,
        "venue": update.venue,
        "candle": update.candle,
        "indicators": update.indicators,
    })
}

fn frame_batch(messages: &[serde_json::Value]) -> serde_json::Value {
    serde_json::json!({"type": "batch", "count": messages.len(), "messages": messages})
}

fn frame_alert(alert: &AlertFired) -> serde_json::Value {
    serde_json::json!({
        "type": "alert",
        "rule_id": alert.rule_id,
        "symbol": alert.symbol,
        "message": alert.message,
        "ts_ms": alert.ts_ms,
    })
}

/// The wire-level `{"type": "pong"}` response to a client's ping.
#[must_use]
pub fn frame_pong() -> serde_json::Value {
    serde_json::json!({"type": "pong"})
}

/// `{user, connected_at, sent_count}` plus the delivery bookkeeping spec
/// §4.8 describes.
struct Connection {
    user: String,
    connected_at_ms: i64,
    sent_count: u64,
    last_sent_ms: Option<i64>,
    ring: VecDeque<serde_json::Value>,
    outbox: mpsc::UnboundedSender<Message>,
}

/// Registry keyed by symbol, each symbol holding its own concurrent map of
/// connections.
pub struct WsFanout {
    by_symbol: DashMap<String, DashMap<Uuid, Connection>>,
    clock: Arc<dyn Clock>,
    throttle_interval: Duration,
    ring_cap: usize,
}

impl WsFanout {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, throttle_interval: Duration, ring_cap: usize) -> Arc<Self> {
        Arc::new(Self { by_symbol: DashMap::new(), clock, throttle_interval, ring_cap })
    }

    /// Registers a freshly-accepted connection, returning its id. Callers
    /// send the `initial` snapshot themselves before the client starts
    /// receiving updates (spec §4.8: "send a snapshot ... before entering
    /// the update stream").
    pub fn register(&self, symbol: &str, user: String, outbox: mpsc::UnboundedSender<Message>) -> Uuid {
        let id = Uuid::new_v4();
        let conn = Connection {
            user,
            connected_at_ms: self.clock.now_ms(),
            sent_count: 0,
            last_sent_ms: None,
            ring: VecDeque::new(),
            outbox,
        };
        self.by_symbol.entry(symbol.to_string()).or_default().insert(id, conn);
        id
    }

    pub fn unregister(&self, symbol: &str, id: Uuid) {
        if let Some(conns) = self.by_symbol.get(symbol) {
            conns.remove(&id);
        }
    }

    /// Connection count for `symbol`, exposed for `/health`.
    #[must_use]
    pub fn connection_count(&self, symbol: &str) -> usize {
        self.by_symbol.get(symbol).map_or(0, |conns| conns.len())
    }

    /// Delivers `update` to every connection on `update.symbol`: sent
    /// immediately if the client hasn't been sent to within
    /// `throttle_interval`, otherwise enqueued for the next flush.
    pub fn handle_chart_update(&self, update: &ChartUpdate) {
        let Some(conns) = self.by_symbol.get(&update.symbol) else {
            return;
        };
        let now_ms = self.clock.now_ms();
        let frame = frame_update(update);
        let mut dead = Vec::new();
        for mut entry in conns.iter_mut() {
            let id = *entry.key();
            let conn = entry.value_mut();
            let throttled = conn
                .last_sent_ms
                .is_some_and(|last| now_ms - last < self.throttle_interval.as_millis() as i64);
            if throttled {
                if conn.ring.len() == self.ring_cap {
                    conn.ring.pop_front();
                }
                conn.ring.push_back(frame.clone());
            } else if Self::send(conn, frame.clone()) {
                conn.last_sent_ms = Some(now_ms);
                conn.sent_count += 1;
            } else {
                dead.push(id);
            }
        }
        drop(conns);
        for id in dead {
            self.unregister(&update.symbol, id);
        }
    }

    /// Delivers a fired alert to the connections on `alert.symbol` whose
    /// registered user matches (the `/ws/{symbol}` connection doubles as
    /// the delivery path for that user's alerts on the same symbol),
    /// bypassing the throttle — alerts are not chart noise.
    pub fn handle_alert(&self, alert: &AlertFired) {
        let Some(conns) = self.by_symbol.get(&alert.symbol) else {
            return;
        };
        let frame = frame_alert(alert);
        let mut dead = Vec::new();
        for mut entry in conns.iter_mut() {
            let id = *entry.key();
            if entry.value().user != alert.user {
                continue;
            }
            let conn = entry.value_mut();
            if Self::send(conn, frame.clone()) {
                conn.sent_count += 1;
            } else {
                dead.push(id);
            }
        }
        drop(conns);
        for id in dead {
            self.unregister(&alert.symbol, id);
        }
    }

    fn send(conn: &Connection, frame: serde_json::Value) -> bool {
        conn.outbox.send(Message::Text(frame.to_string().into())).is_ok()
    }

    /// Sends `message` straight to one connection's outbox, bypassing the
    /// throttle/ring bookkeeping `handle_chart_update` does — for replies
    /// that aren't chart traffic, like a `pong`.
    pub fn send_direct(&self, symbol: &str, id: Uuid, message: Message) -> bool {
        self.by_symbol
            .get(symbol)
            .and_then(|conns| conns.get(&id).map(|conn| conn.outbox.send(message).is_ok()))
            .unwrap_or(false)
    }

    /// Background task: every `batch_window`, drains each client's ring —
    /// a single message if it holds exactly one, else a `batch` envelope.
    pub async fn run_flusher(self: Arc<Self>, batch_window: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(batch_window);
        loop {
            tokio::select! {
                _ = interval.tick() => self.flush_once(),
                _ = shutdown.changed() => return,
            }
        }
    }

    fn flush_once(&self) {
        for symbol_entry in self.by_symbol.iter() {
            let now_ms = self.clock.now_ms();
            let mut dead = Vec::new();
            for mut conn_entry in symbol_entry.value().iter_mut() {
                let id = *conn_entry.key();
                let conn = conn_entry.value_mut();
                if conn.ring.is_empty() {
                    continue;
                }
                let drained: Vec<_> = conn.ring.drain(..).collect();
                let frame = if drained.len() == 1 {
                    drained.into_iter().next().expect("checked len == 1")
                } else {
                    frame_batch(&drained)
                };
                if Self::send(conn, frame) {
                    conn.sent_count += 1;
                    conn.last_sent_ms = Some(now_ms);
                } else {
                    dead.push(id);
                }
            }
            for id in dead {
                symbol_entry.value().remove(&id);
            }
        }
    }
}

/// Builds the `initial` snapshot frame sent right after accept.
#[must_use]
pub fn initial_frame(bars: &[Candle], indicators: Option<&IndicatorRow>) -> serde_json::Value {
    frame_initial(bars, indicators)
}
