//! Telegram Bot API delivery. The recipient is a chat id.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use herald_common::types::Notification;

use crate::channel::{DeliveryChannel, DeliveryError, check_response, payload_str};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

pub struct TelegramChannel {
    client: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl TelegramChannel {
    pub fn new(bot_token: String, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            bot_token,
            api_base: TELEGRAM_API_BASE.to_string(),
        })
    }

    /// Point the channel at a different API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }
}

/// Render the message text: `text`, else `title` + `body`, else the raw payload.
pub fn render_text(payload: &serde_json::Value) -> Result<String, DeliveryError> {
    if let Some(text) = payload_str(payload, "text") {
        return Ok(text.to_string());
    }

    match (payload_str(payload, "title"), payload_str(payload, "body")) {
        (Some(title), Some(body)) => Ok(format!("{}\n\n{}", title, body)),
        (Some(only), None) | (None, Some(only)) => Ok(only.to_string()),
        (None, None) if payload.is_null() => {
            Err(DeliveryError::InvalidPayload("payload is empty".to_string()))
        }
        (None, None) => Ok(payload.to_string()),
    }
}

fn validate_chat_id(recipient: &str) -> Result<&str, DeliveryError> {
    let chat_id = recipient.trim();
    let numeric = chat_id
        .strip_prefix('-')
        .unwrap_or(chat_id)
        .chars()
        .all(|c| c.is_ascii_digit());
    if (!chat_id.is_empty() && numeric && chat_id != "-") || chat_id.starts_with('@') {
        Ok(chat_id)
    } else {
        Err(DeliveryError::InvalidRecipient(format!(
            "'{}' is not a Telegram chat id or @channel",
            recipient
        )))
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let chat_id = validate_chat_id(&notification.recipient)?;
        let text = render_text(&notification.payload)?;

        let response = self
            .client
            .post(self.endpoint())
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;
        check_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_text_prefers_text_field() {
        let payload = json!({"text": "plain", "title": "ignored"});
        assert_eq!(render_text(&payload).unwrap(), "plain");
    }

    #[test]
    fn test_render_text_title_and_body() {
        let payload = json!({"title": "Reminder", "body": "Pay rent"});
        assert_eq!(render_text(&payload).unwrap(), "Reminder\n\nPay rent");
        assert_eq!(render_text(&json!({"body": "Only body"})).unwrap(), "Only body");
    }

    #[test]
    fn test_render_text_fallbacks() {
        assert_eq!(render_text(&json!({"n": 1})).unwrap(), r#"{"n":1}"#);
        assert!(render_text(&serde_json::Value::Null).is_err());
    }

    #[test]
    fn test_chat_id_validation() {
        assert_eq!(validate_chat_id("12345").unwrap(), "12345");
        assert_eq!(validate_chat_id("-100200300").unwrap(), "-100200300");
        assert_eq!(validate_chat_id("@herald_alerts").unwrap(), "@herald_alerts");
        assert!(validate_chat_id("").is_err());
        assert!(validate_chat_id("-").is_err());
        assert!(validate_chat_id("user@example.com").is_err());
    }

    #[test]
    fn test_endpoint_includes_token() {
        let channel = TelegramChannel::new("123:abc".to_string(), Duration::from_secs(1))
            .unwrap()
            .with_api_base("http://localhost:8081/");
        assert_eq!(channel.endpoint(), "http://localhost:8081/bot123:abc/sendMessage");
    }
}
