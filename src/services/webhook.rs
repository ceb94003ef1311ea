use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ports::WebhookNotifier;

pub const APPROVED_MESSAGE: &str = "Transaction approved ✅";
pub const REJECTED_MESSAGE: &str = "Invalid receipt ❌";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookPayload {
    pub tel: String,
    pub msg: String,
}

impl WebhookPayload {
    pub fn decision(phone: &str, approved: bool) -> Self {
        Self {
            tel: phone.to_string(),
            msg: if approved { APPROVED_MESSAGE } else { REJECTED_MESSAGE }.to_string(),
        }
    }
}

/// Posts decision messages to the configured webhook. Without a URL every
/// call is a no-op.
#[derive(Clone)]
pub struct HttpWebhookNotifier {
    client: Client,
    url: Option<String>,
}

impl HttpWebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { client, url }
    }
}

#[async_trait]
impl WebhookNotifier for HttpWebhookNotifier {
    async fn notify_decision(&self, phone: &str, approved: bool) {
        let Some(url) = &self.url else {
            debug!("WEBHOOK_URL not set, skipping decision notification");
            return;
        };

        let payload = WebhookPayload::decision(phone, approved);
        match self.client.post(url).json(&payload).send().await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                info!(status = status.as_u16(), body = %body, approved, "Webhook delivered");
            }
            Err(e) => {
                warn!(error = %e, approved, "Webhook delivery failed");
            }
        }
    }
}
