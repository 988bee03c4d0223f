//! Generic HTTP webhook delivery.
//!
//! The recipient is the target URL. The body is a JSON envelope around the
//! opaque payload, optionally signed with HMAC-SHA256 in `X-Herald-Signature`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

use herald_common::types::Notification;

use crate::channel::{DeliveryChannel, DeliveryError, check_response};

pub const SIGNATURE_HEADER: &str = "X-Herald-Signature";

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    id: Uuid,
    recipient: &'a str,
    scheduled_at: DateTime<Utc>,
    payload: &'a serde_json::Value,
}

#[derive(Clone)]
pub struct WebhookChannel {
    client: reqwest::Client,
    secret: Option<String>,
}

impl WebhookChannel {
    pub fn new(timeout: Duration, secret: Option<String>) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Herald-Webhook/1.0")
            .build()?;
        Ok(Self { client, secret })
    }
}

/// Compute `sha256=<hex>` over `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, DeliveryError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| DeliveryError::Signing(e.to_string()))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

fn validate_url(recipient: &str) -> Result<reqwest::Url, DeliveryError> {
    let url = reqwest::Url::parse(recipient)
        .map_err(|e| DeliveryError::InvalidRecipient(format!("{}: {}", recipient, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DeliveryError::InvalidRecipient(format!(
            "unsupported scheme '{}' in {}",
            other, recipient
        ))),
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let url = validate_url(&notification.recipient)?;
        let body = serde_json::to_vec(&WebhookBody {
            id: notification.id,
            recipient: &notification.recipient,
            scheduled_at: notification.scheduled_at,
            payload: &notification.payload,
        })
        .map_err(|e| DeliveryError::InvalidPayload(e.to_string()))?;

        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign(secret, &body)?);
        }

        let response = request.body(body).send().await?;
        check_response(response).await?;

        tracing::debug!(notification_id = %notification.id, "Webhook delivered");
        Ok(())
    }
}
