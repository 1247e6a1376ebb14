//! A generic REST-polling [`VenueSource`] backing both `PolledDuringHours`
//! and `PolledRateLimited` venues. As with [`crate::ws_source::WsJsonSource`],
//! the response schema is venue-specific and pluggable via
//! [`ResponseDecoder`]; this type owns only the HTTP lifecycle, timeouts,
//! and 429 handling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marketflow_core::error::{MarketFlowError, Result};
use marketflow_model::{Candle, Timeframe};
use std::time::Duration;

use crate::collector::{CollectedEvent, VenueSource};

/// Builds request URLs and parses responses for one venue's REST schema.
pub trait ResponseDecoder: Send + Sync {
    fn snapshot_url(&self, base_url: &str, symbol: &str) -> String;
    fn historical_url(&self, base_url: &str, symbol: &str, timeframe: Timeframe, from: DateTime<Utc>, to: DateTime<Utc>) -> String;
    fn decode_snapshot(&self, symbol: &str, body: &str) -> Vec<CollectedEvent>;
    fn decode_historical(&self, body: &str) -> Vec<Candle>;
}

/// Polls `base_url` for each subscribed symbol once per [`VenueSource::poll`]
/// call, decoding responses with a caller-supplied [`ResponseDecoder`].
pub struct RestPollSource {
    base_url: String,
    client: reqwest::Client,
    decoder: Box<dyn ResponseDecoder>,
    symbols: Vec<String>,
}

impl RestPollSource {
    #[must_use]
    pub fn new(base_url: impl Into<String>, decoder: Box<dyn ResponseDecoder>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with a finite timeout");
        Self { base_url: base_url.into(), client, decoder, symbols: Vec::new() }
    }
}

#[async_trait]
impl VenueSource for RestPollSource {
    async fn connect(&mut self) -> Result<()> {
        // REST has no persistent connection; the "connect" step validates
        // reachability so the circuit breaker still gates availability.
        self.client
            .get(&self.base_url)
            .send()
            .await
            .map_err(|e| MarketFlowError::Transport(std::io::Error::other(e.to_string())))?;
        Ok(())
    }

    async fn subscribe(&mut self, symbols: &[String]) -> Result<()> {
        self.symbols = symbols.to_vec();
        Ok(())
    }

    async fn poll(&mut self) -> Result<Vec<CollectedEvent>> {
        let mut events = Vec::new();
        for symbol in &self.symbols {
            let url = self.decoder.snapshot_url(&self.base_url, symbol);
            let response = self.client.get(&url).send().await.map_err(|e| {
                MarketFlowError::Transport(std::io::Error::other(e.to_string()))
            })?;
            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(MarketFlowError::RateLimited {
                    venue: self.base_url.clone(),
                    retry_after: Duration::from_secs(60),
                });
            }
            let body = response
                .text()
                .await
                .map_err(|e| MarketFlowError::Transport(std::io::Error::other(e.to_string())))?;
            events.extend(self.decoder.decode_snapshot(symbol, &body));
        }
        Ok(events)
    }

    async fn fetch_historical(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let url = self.decoder.historical_url(&self.base_url, symbol, timeframe, from, to);
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MarketFlowError::Transport(std::io::Error::other(e.to_string())))?
            .text()
            .await
            .map_err(|e| MarketFlowError::Transport(std::io::Error::other(e.to_string())))?;
        Ok(self.decoder.decode_historical(&body))
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}
