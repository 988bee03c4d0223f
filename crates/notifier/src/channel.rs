use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use herald_common::config::AppConfig;
use herald_common::types::{ChannelType, Notification};

use crate::email::EmailChannel;
use crate::log::LogChannel;
use crate::telegram::TelegramChannel;
use crate::webhook::WebhookChannel;

/// Why a single delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("signing error: {0}")]
    Signing(String),
}

/// Transport capable of delivering a notification's payload to its recipient.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Build the channel selected by configuration.
///
/// Credential presence is checked by `AppConfig`; anything still missing here
/// is a startup failure.
pub fn build_channel(config: &AppConfig) -> anyhow::Result<Arc<dyn DeliveryChannel>> {
    let timeout = Duration::from_secs(config.delivery_timeout_secs);

    let channel: Arc<dyn DeliveryChannel> = match config.delivery_channel {
        ChannelType::Log => Arc::new(LogChannel),
        ChannelType::Webhook => Arc::new(WebhookChannel::new(timeout, config.webhook_secret.clone())?),
        ChannelType::Telegram => {
            let token = config
                .telegram_bot_token
                .clone()
                .ok_or_else(|| anyhow::anyhow!("TELEGRAM_BOT_TOKEN is required"))?;
            Arc::new(TelegramChannel::new(token, timeout)?)
        }
        ChannelType::Email => {
            let api_key = config
                .resend_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("RESEND_API_KEY is required"))?;
            let from = config
                .email_from
                .clone()
                .ok_or_else(|| anyhow::anyhow!("EMAIL_FROM is required"))?;
            Arc::new(EmailChannel::new(api_key, from, timeout)?)
        }
    };

    tracing::info!(channel = channel.name(), "Delivery channel configured");
    Ok(channel)
}

/// Turn a non-2xx response into `DeliveryError::Rejected`.
pub(crate) async fn check_response(response: reqwest::Response) -> Result<(), DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(DeliveryError::Rejected {
        status: status.as_u16(),
        body: truncate(&body, 512),
    })
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

/// Pull a string field out of an opaque payload.
pub(crate) fn payload_str<'a>(payload: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}
