//! Chat webhook delivery adapter.
//!
//! Implements [`notifier::WebhookSender`] with a shared [`reqwest::Client`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport lives here; the [`notifier`] crate sees
//! only [`notifier::WebhookSender`]. Each call issues exactly one POST. There
//! are no retries and the response body is never read: any HTTP response is
//! reported as a [`notifier::DeliveryReceipt`], only transport failures are
//! errors.

use std::time::Duration;

use async_trait::async_trait;
use notifier::{DeliveryError, DeliveryReceipt, WebhookSender, WebhookUrl};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Posts JSON payloads to Discord-compatible webhooks.
#[derive(Debug, Clone, Default)]
pub struct DiscordWebhookClient {
    client: reqwest::Client,
}

impl DiscordWebhookClient {
    /// Creates a client with reqwest's defaults (no request timeout).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that abandons a request after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::new(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSender for DiscordWebhookClient {
    async fn post_json(
        &self,
        url: &WebhookUrl,
        body: Vec<u8>,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let response = self
            .client
            .post(url.expose())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            // reqwest errors carry the full URL; strip it so the token stays out of logs.
            .map_err(|e| DeliveryError::new(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        debug!(endpoint = %url, status, "Webhook responded");
        Ok(DeliveryReceipt { status })
    }
}
