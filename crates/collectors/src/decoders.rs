//! Reference wire decoders speaking MarketFlow's own normalized JSON
//! schema directly (spec §1: "heterogeneous venues are normalized at the
//! boundary"). A real deployment swaps these for venue-specific decoders
//! implementing the same [`FrameDecoder`]/[`ResponseDecoder`] traits; these
//! exist so the collector run-loops have something concrete to drive.

use chrono::{DateTime, Utc};
use marketflow_model::{Candle, Side, Timeframe, Trade, Venue};
use serde::Deserialize;

use crate::collector::CollectedEvent;
use crate::rest_source::ResponseDecoder;
use crate::ws_source::FrameDecoder;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WireFrame {
    Trade { symbol: String, price: f64, quantity: f64, ts_ms: i64, side: Option<WireSide> },
    Bar { symbol: String, candle: WireCandle },
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum WireSide {
    Buy,
    Sell,
}

#[derive(Debug, Deserialize)]
struct WireCandle {
    ts_bucket: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    trade_count: u64,
}

/// Decodes a streaming venue's multiplexed trade/kline socket, one JSON
/// object per text frame.
pub struct JsonStreamDecoder {
    venue: Venue,
}

impl JsonStreamDecoder {
    #[must_use]
    pub fn new(venue: Venue) -> Self {
        Self { venue }
    }
}

impl FrameDecoder for JsonStreamDecoder {
    fn decode(&self, frame: &str) -> Vec<CollectedEvent> {
        let Ok(wire) = serde_json::from_str::<WireFrame>(frame) else {
            return Vec::new();
        };
        match wire {
            WireFrame::Trade { symbol, price, quantity, ts_ms, side } => {
                vec![CollectedEvent::Tick(Trade {
                    venue: self.venue,
                    symbol,
                    price,
                    quantity,
                    ts_ms,
                    side_hint: side.map(|s| match s {
                        WireSide::Buy => Side::Buy,
                        WireSide::Sell => Side::Sell,
                    }),
                })]
            }
            WireFrame::Bar { symbol, candle } => vec![CollectedEvent::Bar {
                symbol,
                candle: Candle {
                    ts_bucket: candle.ts_bucket,
                    timeframe: Timeframe::base(),
                    open: candle.open,
                    high: candle.high,
                    low: candle.low,
                    close: candle.close,
                    volume: candle.volume,
                    trade_count: candle.trade_count,
                    completed: true,
                },
            }],
        }
    }

    fn subscribe_frames(&self, symbols: &[String]) -> Vec<String> {
        vec![serde_json::json!({"kind": "subscribe", "symbols": symbols}).to_string()]
    }
}

/// Decodes a REST venue's per-symbol snapshot/history endpoints, speaking
/// the same normalized JSON schema as [`JsonStreamDecoder`].
pub struct JsonRestDecoder {
    venue: Venue,
}

impl JsonRestDecoder {
    #[must_use]
    pub fn new(venue: Venue) -> Self {
        Self { venue }
    }
}

impl ResponseDecoder for JsonRestDecoder {
    fn snapshot_url(&self, base_url: &str, symbol: &str) -> String {
        format!("{base_url}/snapshot?symbol={symbol}")
    }

    fn historical_url(&self, base_url: &str, symbol: &str, timeframe: Timeframe, from: DateTime<Utc>, to: DateTime<Utc>) -> String {
        format!(
            "{base_url}/history?symbol={symbol}&timeframe={}&from={}&to={}",
            timeframe.code(),
            from.timestamp_millis(),
            to.timestamp_millis(),
        )
    }

    fn decode_snapshot(&self, symbol: &str, body: &str) -> Vec<CollectedEvent> {
        let Ok(wire) = serde_json::from_str::<WireFrame>(body) else {
            return Vec::new();
        };
        match wire {
            WireFrame::Trade { price, quantity, ts_ms, side, .. } => vec![CollectedEvent::Tick(Trade {
                venue: self.venue,
                symbol: symbol.to_string(),
                price,
                quantity,
                ts_ms,
                side_hint: side.map(|s| match s {
                    WireSide::Buy => Side::Buy,
                    WireSide::Sell => Side::Sell,
                }),
            })],
            WireFrame::Bar { candle, .. } => vec![CollectedEvent::Bar {
                symbol: symbol.to_string(),
                candle: Candle {
                    ts_bucket: candle.ts_bucket,
                    timeframe: Timeframe::base(),
                    open: candle.open,
                    high: candle.high,
                    low: candle.low,
                    close: candle.close,
                    volume: candle.volume,
                    trade_count: candle.trade_count,
                    completed: true,
                },
            }],
        }
    }

    fn decode_historical(&self, body: &str) -> Vec<Candle> {
        let Ok(wires) = serde_json::from_str::<Vec<WireCandle>>(body) else {
            return Vec::new();
        };
        wires
            .into_iter()
            .map(|candle| Candle {
                ts_bucket: candle.ts_bucket,
                timeframe: Timeframe::base(),
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
                volume: candle.volume,
                trade_count: candle.trade_count,
                completed: true,
            })
            .collect()
    }
}
