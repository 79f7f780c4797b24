//! Alerting for permanently failed ledger operations.

use async_trait::async_trait;
use ledger_core::config::AlertsConfig;
use serde::Serialize;
use tracing::{error, warn};

/// One operator-facing alert.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub title: String,
    pub body: String,
    pub tx_hash: Option<String>,
}

impl Alert {
    pub fn permanent_failure(tx_hash: &str, service: &str, function: &str, reason: &str) -> Self {
        Self {
            title: format!("Ledger operation dead-lettered: {}::{}", service, function),
            body: reason.to_string(),
            tx_hash: Some(tx_hash.to_string()),
        }
    }
}

/// Delivery seam for alerts. Implementations must not fail the pipeline:
/// delivery problems are logged and swallowed.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: Alert);
}

/// Default sink: structured error log only.
#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn raise(&self, alert: Alert) {
        error!(
            title = %alert.title,
            tx_hash = ?alert.tx_hash,
            body = %alert.body,
            "ALERT"
        );
    }
}

/// Posts alerts to a Discord-style JSON webhook when configured, falling
/// back to the log otherwise.
pub struct WebhookAlertSink {
    webhook_url: Option<String>,
    http_client: reqwest::Client,
}

impl WebhookAlertSink {
    pub fn new(config: &AlertsConfig) -> Self {
        Self {
            webhook_url: config.webhook_url.clone(),
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn raise(&self, alert: Alert) {
        error!(
            title = %alert.title,
            tx_hash = ?alert.tx_hash,
            body = %alert.body,
            "ALERT"
        );

        let Some(url) = &self.webhook_url else {
            return;
        };

        let payload = serde_json::json!({
            "content": format!("🚨 **{}**\n{}\ntx: {}",
                alert.title,
                alert.body,
                alert.tx_hash.as_deref().unwrap_or("-")),
        });

        if let Err(e) = self.http_client.post(url).json(&payload).send().await {
            warn!(error = %e, "Failed to deliver webhook alert");
        }
    }
}
