use async_trait::async_trait;

use herald_common::types::Notification;

use crate::channel::{DeliveryChannel, DeliveryError};

/// Writes the notification to the log and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

#[async_trait]
impl DeliveryChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        tracing::info!(
            notification_id = %notification.id,
            recipient = %notification.recipient,
            payload = %notification.payload,
            "Notification delivered to log"
        );
        Ok(())
    }
}
