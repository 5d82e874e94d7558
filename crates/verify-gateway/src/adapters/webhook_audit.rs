//! Audit sink posting one webhook message per verification request.
//!
//! Delivery runs on a spawned task. The request path never waits on it and a
//! failed post is only logged.

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::AuditEvent;
use crate::ports::AuditSink;

/// Embed colour for audit messages
const EMBED_COLOR: u32 = 43488;

/// Errors building the webhook client.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct WebhookAuditSink {
    client: Client,
    url: String,
}

impl WebhookAuditSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(2)))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post(client: Client, url: String, body: Value, request_id: String) {
        match client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(request_id = %request_id, "Audit message delivered");
            }
            Ok(response) => {
                warn!(request_id = %request_id, status = %response.status(), "Audit webhook refused message");
            }
            Err(e) => {
                // reqwest errors carry the URL; strip it, the webhook URL is a secret.
                warn!(request_id = %request_id, error = %e.without_url(), "Audit webhook unreachable");
            }
        }
    }
}

impl std::fmt::Debug for WebhookAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAuditSink")
            .field("url", &"<redacted>")
            .finish()
    }
}

impl AuditSink for WebhookAuditSink {
    fn record(&self, event: AuditEvent) {
        let body = webhook_body(&event);
        let request_id = event.request_id.to_string();
        let client = self.client.clone();
        let url = self.url.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(Self::post(client, url, body, request_id));
            }
            Err(_) => debug!(request_id = %request_id, "No runtime, audit event dropped"),
        }
    }
}

/// Discord-style webhook body for one audit event.
pub fn webhook_body(event: &AuditEvent) -> Value {
    let or_none = |value: &Option<String>| value.clone().unwrap_or_else(|| "None".to_string());

    json!({
        "embeds": [{
            "title": "Verification request",
            "color": EMBED_COLOR,
            "fields": [
                { "name": "IP", "value": event.client_ip.to_string(), "inline": true },
                { "name": "Referrer", "value": or_none(&event.referrer), "inline": true },
                { "name": "URI", "value": format!("`{}`", event.uri) },
                { "name": "User agent", "value": or_none(&event.user_agent) },
            ],
            "footer": { "text": event.request_id.to_string() },
            "timestamp": event.received_at.to_rfc3339(),
        }]
    })
}
