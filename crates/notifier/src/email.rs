//! E-mail delivery through the Resend HTTP API. The recipient is an address.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use herald_common::types::Notification;

use crate::channel::{DeliveryChannel, DeliveryError, check_response, payload_str};

const RESEND_API_BASE: &str = "https://api.resend.com";
const DEFAULT_SUBJECT: &str = "Notification";

#[derive(Debug, Serialize, PartialEq)]
struct ResendEmail<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: String,
}

pub struct EmailChannel {
    client: reqwest::Client,
    api_key: String,
    from: String,
    api_base: String,
}

impl EmailChannel {
    pub fn new(api_key: String, from: String, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            from,
            api_base: RESEND_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn build_message<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> Result<ResendEmail<'a>, DeliveryError> {
        let to = notification.recipient.trim();
        if !looks_like_address(to) {
            return Err(DeliveryError::InvalidRecipient(format!(
                "'{}' is not an e-mail address",
                notification.recipient
            )));
        }

        let payload = &notification.payload;
        let subject = payload_str(payload, "subject")
            .or_else(|| payload_str(payload, "title"))
            .unwrap_or(DEFAULT_SUBJECT);
        let text = payload_str(payload, "body")
            .or_else(|| payload_str(payload, "text"))
            .map(str::to_string)
            .ok_or_else(|| DeliveryError::InvalidPayload("e-mail needs a body".to_string()))?;

        Ok(ResendEmail {
            from: &self.from,
            to: vec![to],
            subject,
            text,
        })
    }
}

fn looks_like_address(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !s.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let message = self.build_message(notification)?;

        let response = self
            .client
            .post(format!("{}/emails", self.api_base.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&message)
            .send()
            .await?;
        check_response(response).await
    }
}
