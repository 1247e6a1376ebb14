//! Notification channels (spec §4.7: "Channels are independent; a failure
//! in one does not suppress the others. Each channel has a 10 s timeout;
//! failures are counted, not retried within the call.").

use std::time::Duration;

use async_trait::async_trait;
use marketflow_model::{AlertChannel, AlertFired};
use tokio::sync::mpsc;

/// Outbound notification timeout (spec §7 "Timeouts" table).
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// The [`AlertChannel`] this sender serves, used only for logging.
    fn channel(&self) -> AlertChannel;

    async fn send(&self, fired: &AlertFired) -> Result<(), String>;
}

/// Fans a fired alert out to the user's WS connections via the in-process
/// bus (`alerts:<user>`); the WS fan-out task owns actual delivery.
pub struct WsSender {
    bus_tx: mpsc::UnboundedSender<marketflow_model::BusMessage>,
}

impl WsSender {
    #[must_use]
    pub fn new(bus_tx: mpsc::UnboundedSender<marketflow_model::BusMessage>) -> Self {
        Self { bus_tx }
    }
}

#[async_trait]
impl NotificationSender for WsSender {
    fn channel(&self) -> AlertChannel {
        AlertChannel::Ws
    }

    async fn send(&self, fired: &AlertFired) -> Result<(), String> {
        self.bus_tx
            .send(marketflow_model::BusMessage::Alert(fired.clone()))
            .map_err(|err| err.to_string())
    }
}

/// Posts the alert as a JSON payload to a configured webhook URL.
pub struct WebhookSender {
    client: reqwest::Client,
    url: String,
}

impl WebhookSender {
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn channel(&self) -> AlertChannel {
        AlertChannel::Webhook
    }

    async fn send(&self, fired: &AlertFired) -> Result<(), String> {
        let resp = self.client.post(&self.url).json(fired).send().await.map_err(|err| err.to_string())?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("webhook returned {}", resp.status()))
        }
    }
}

/// Posts to a Slack incoming-webhook URL, wrapping the message in Slack's
/// `{"text": ...}` envelope.
pub struct SlackSender {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackSender {
    #[must_use]
    pub fn new(client: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self { client, webhook_url: webhook_url.into() }
    }
}

#[async_trait]
impl NotificationSender for SlackSender {
    fn channel(&self) -> AlertChannel {
        AlertChannel::Slack
    }

    async fn send(&self, fired: &AlertFired) -> Result<(), String> {
        let body = serde_json::json!({ "text": fired.message });
        let resp = self.client.post(&self.webhook_url).json(&body).send().await.map_err(|err| err.to_string())?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("slack webhook returned {}", resp.status()))
        }
    }
}

/// An `EmailSender` needs an SMTP relay or transactional-email provider
/// this workspace has no account for; it logs instead of bouncing the
/// whole dispatch. Swap in a real sender once a provider is wired up.
pub struct LoggingEmailSender;

#[async_trait]
impl NotificationSender for LoggingEmailSender {
    fn channel(&self) -> AlertChannel {
        AlertChannel::Email
    }

    async fn send(&self, fired: &AlertFired) -> Result<(), String> {
        tracing::info!(user = %fired.user, rule_id = %fired.rule_id, message = %fired.message, "email notification (no provider configured, logging only)");
        Ok(())
    }
}

/// Runs `send` under [`DISPATCH_TIMEOUT`], collapsing a timeout into the
/// same `Err(String)` shape as a send failure.
pub async fn send_with_timeout(sender: &dyn NotificationSender, fired: &AlertFired) -> Result<(), String> {
    match tokio::time::timeout(DISPATCH_TIMEOUT, sender.send(fired)).await {
        Ok(result) => result,
        Err(_) => Err(format!("{:?} channel timed out after {DISPATCH_TIMEOUT:?}", sender.channel())),
    }
}
