pub mod error;

use crate::error::NotifierError;
use configuration::NotifierConfig;
use events::BotEvent;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::broadcast;

/// Posts a JSON envelope to a configured webhook whenever a critical
/// `BotEvent` (crash or halt) crosses the bus — spec §7: anything that
/// touches order flow or takes a bot offline is surfaced, never silently
/// retried.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event: &'a BotEvent,
}

impl WebhookNotifier {
    /// Returns `None` if no webhook URL is configured, allowing the
    /// caller to skip the notifier task entirely.
    pub fn new(config: &NotifierConfig) -> Option<Self> {
        let webhook_url = config.webhook_url.clone()?;
        if webhook_url.is_empty() {
            return None;
        }
        Some(Self {
            client: Client::new(),
            webhook_url,
        })
    }

    pub async fn send(&self, event: &BotEvent) -> Result<(), NotifierError> {
        let payload = WebhookPayload { event };
        let response = self.client.post(&self.webhook_url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(NotifierError::WebhookRejected { status, body });
        }

        Ok(())
    }
}

/// A long-running service that listens on the shared `BotEvent` broadcast
/// channel and forwards every critical event to the configured webhook.
pub async fn run_notifier_service(
    notifier: WebhookNotifier,
    mut event_rx: broadcast::Receiver<BotEvent>,
) {
    tracing::info!("notifier service started, watching for critical bot events");

    loop {
        match event_rx.recv().await {
            Ok(event) => {
                if !event.is_critical() {
                    continue;
                }
                if let Err(e) = notifier.send(&event).await {
                    tracing::error!(error = ?e, bot_id = %event.bot_id(), "failed to deliver webhook notification");
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("notifier service lagged, skipped {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::error!("event bus closed, notifier service shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_none_without_a_configured_webhook() {
        let config = NotifierConfig { webhook_url: None };
        assert!(WebhookNotifier::new(&config).is_none());
    }

    #[test]
    fn new_is_none_for_an_empty_webhook_url() {
        let config = NotifierConfig { webhook_url: Some(String::new()) };
        assert!(WebhookNotifier::new(&config).is_none());
    }

    #[test]
    fn new_is_some_for_a_real_url() {
        let config = NotifierConfig { webhook_url: Some("https://example.com/hook".to_string()) };
        assert!(WebhookNotifier::new(&config).is_some());
    }
}
