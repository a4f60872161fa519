//! Webhook notification dispatch.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use docflow_core::{Error, NotificationDispatcher, Result};

/// Timeout for notification posts (seconds).
const NOTIFY_TIMEOUT_SECS: u64 = 15;

/// HTTP dispatcher posting completion notifications to a webhook.
pub struct WebhookDispatcher {
    client: Client,
    endpoint: String,
}

impl WebhookDispatcher {
    pub fn new(endpoint: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, endpoint }
    }

    /// Create from `DOCFLOW_NOTIFY_WEBHOOK`, if configured.
    pub fn from_env() -> Option<Self> {
        std::env::var("DOCFLOW_NOTIFY_WEBHOOK")
            .ok()
            .filter(|url| !url.is_empty())
            .map(Self::new)
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn send_completion_notification(
        &self,
        recipient: &str,
        job_id: Uuid,
        csv_ref: &str,
    ) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "event": "job.completed",
                "recipient": recipient,
                "jobId": job_id,
                "csvRef": csv_ref,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        debug!(job_id = %job_id, recipient, "Dispatched completion notification");
        Ok(())
    }
}
