use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification delivery status.
///
/// `Pending` is the only state the dispatcher selects from. `Sent` is terminal.
/// `Failed` is only written when a bounded retry policy is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Transport used to deliver notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Log,
    Webhook,
    Telegram,
    Email,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelType::Log => write!(f, "log"),
            ChannelType::Webhook => write!(f, "webhook"),
            ChannelType::Telegram => write!(f, "telegram"),
            ChannelType::Email => write!(f, "email"),
        }
    }
}

impl std::str::FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(ChannelType::Log),
            "webhook" => Ok(ChannelType::Webhook),
            "telegram" => Ok(ChannelType::Telegram),
            "email" => Ok(ChannelType::Email),
            other => Err(format!(
                "unknown delivery channel '{}' (expected log, webhook, telegram or email)",
                other
            )),
        }
    }
}

/// A notification queued for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    /// Opaque destination, interpreted only by the delivery channel.
    pub recipient: String,
    /// Opaque content, forwarded unmodified to the delivery channel.
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    pub scheduled_at: DateTime<Utc>,
    /// Failed delivery attempts recorded under a bounded retry policy.
    pub attempts: i32,
    pub last_error: Option<String>,
    /// Set while another dispatcher instance holds a delivery claim.
    pub claimed_until: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// A notification is due iff it is pending and its scheduled time is at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Pending && self.scheduled_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_notification(status: DeliveryStatus, scheduled_at: DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient: "user@example.com".to_string(),
            payload: serde_json::json!({"body": "hello"}),
            status,
            scheduled_at,
            attempts: 0,
            last_error: None,
            claimed_until: None,
            sent_at: None,
            created_at: scheduled_at - Duration::hours(1),
        }
    }

    #[test]
    fn test_is_due_boundaries() {
        let now = Utc::now();
        assert!(make_notification(DeliveryStatus::Pending, now - Duration::seconds(1)).is_due(now));
        assert!(make_notification(DeliveryStatus::Pending, now).is_due(now));
        assert!(!make_notification(DeliveryStatus::Pending, now + Duration::seconds(10)).is_due(now));
    }

    #[test]
    fn test_non_pending_never_due() {
        let past = Utc::now() - Duration::days(1);
        assert!(!make_notification(DeliveryStatus::Sent, past).is_due(Utc::now()));
        assert!(!make_notification(DeliveryStatus::Failed, past).is_due(Utc::now()));
    }

    #[test]
    fn test_channel_type_parse() {
        assert_eq!("Webhook".parse::<ChannelType>(), Ok(ChannelType::Webhook));
        assert_eq!(" email ".parse::<ChannelType>(), Ok(ChannelType::Email));
        assert!("sms".parse::<ChannelType>().is_err());
    }

    #[test]
    fn test_status_display_matches_storage() {
        assert_eq!(DeliveryStatus::Pending.to_string(), "pending");
        assert_eq!(DeliveryStatus::Sent.to_string(), "sent");
        assert_eq!(DeliveryStatus::Failed.to_string(), "failed");
    }
}
