//! Notification service: the writer side used by request-handling code.
//!
//! Scheduling stamps `created_at` and relative due times with the same injected
//! [`Clock`] the dispatcher polls with, so due-time comparisons cannot drift.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::clock::Clock;
use herald_common::error::AppError;
use herald_common::types::{DeliveryStatus, Notification};

/// Parameters for scheduling a new notification.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewNotification {
    pub recipient: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Absolute due time. Takes precedence over `delay_seconds`.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Due time relative to now. Both unset means "due immediately".
    pub delay_seconds: Option<i64>,
}

impl NewNotification {
    /// Validate and build a pending notification stamped by `clock`.
    pub fn into_notification(self, clock: &dyn Clock) -> Result<Notification, AppError> {
        let recipient = self.recipient.trim().to_string();
        if recipient.is_empty() {
            return Err(AppError::Validation("recipient must not be empty".to_string()));
        }
        if self.delay_seconds.is_some_and(|d| d < 0) {
            return Err(AppError::Validation(
                "delay_seconds must not be negative".to_string(),
            ));
        }

        let now = clock.now();
        let scheduled_at = match (self.scheduled_at, self.delay_seconds) {
            (Some(at), _) => at,
            (None, Some(delay)) => Duration::try_seconds(delay)
                .and_then(|d| now.checked_add_signed(d))
                .ok_or_else(|| {
                    AppError::Validation(format!("delay_seconds {} is out of range", delay))
                })?,
            (None, None) => now,
        };

        Ok(Notification {
            id: Uuid::new_v4(),
            recipient,
            payload: self.payload,
            status: DeliveryStatus::Pending,
            scheduled_at,
            attempts: 0,
            last_error: None,
            claimed_until: None,
            sent_at: None,
            created_at: now,
        })
    }
}

/// Parameters for editing a notification before it is delivered.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct UpdateNotificationParams {
    pub recipient: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Service layer for notification writes.
#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl NotificationService {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Persist a new pending notification.
    pub async fn schedule(&self, params: NewNotification) -> Result<Notification, AppError> {
        let notification = params.into_notification(self.clock.as_ref())?;

        let created: Notification = sqlx::query_as(
            r#"
            INSERT INTO notifications (id, recipient, payload, status, scheduled_at, attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6)
            RETURNING *
            "#,
        )
        .bind(notification.id)
        .bind(&notification.recipient)
        .bind(&notification.payload)
        .bind(notification.status.to_string())
        .bind(notification.scheduled_at)
        .bind(notification.created_at)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            notification_id = %created.id,
            scheduled_at = %created.scheduled_at,
            "Notification scheduled"
        );

        Ok(created)
    }

    /// Get a single notification by ID.
    pub async fn get(&self, id: Uuid) -> Result<Notification, AppError> {
        sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))
    }

    /// List notifications in a given status, most recently scheduled first.
    pub async fn list_by_status(
        &self,
        status: DeliveryStatus,
    ) -> Result<Vec<Notification>, AppError> {
        let rows: Vec<Notification> = sqlx::query_as(
            "SELECT * FROM notifications WHERE status = $1 ORDER BY scheduled_at DESC",
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Edit recipient, payload or due time of a still-pending notification.
    pub async fn update_content(
        &self,
        id: Uuid,
        params: &UpdateNotificationParams,
    ) -> Result<Notification, AppError> {
        let existing = self.get(id).await?;
        if existing.status != DeliveryStatus::Pending {
            return Err(AppError::Validation(format!(
                "Notification {} is {} and can no longer be edited",
                id, existing.status
            )));
        }

        let recipient = match &params.recipient {
            Some(r) if r.trim().is_empty() => {
                return Err(AppError::Validation("recipient must not be empty".to_string()));
            }
            Some(r) => r.trim().to_string(),
            None => existing.recipient,
        };
        let payload = params.payload.clone().unwrap_or(existing.payload);
        let scheduled_at = params.scheduled_at.unwrap_or(existing.scheduled_at);

        // The status guard makes a concurrent dispatch win over a late edit.
        let updated: Notification = sqlx::query_as(
            r#"
            UPDATE notifications
            SET recipient = $1, payload = $2, scheduled_at = $3
            WHERE id = $4 AND status = $5
            RETURNING *
            "#,
        )
        .bind(&recipient)
        .bind(&payload)
        .bind(scheduled_at)
        .bind(id)
        .bind(DeliveryStatus::Pending.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::Validation(format!("Notification {} was dispatched before the edit", id))
        })?;

        tracing::info!(notification_id = %id, "Notification updated");

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_common::clock::ManualClock;

    fn params(delay_seconds: Option<i64>) -> NewNotification {
        NewNotification {
            recipient: " user@example.com ".to_string(),
            payload: serde_json::json!({"subject": "Hi", "body": "Hello"}),
            scheduled_at: None,
            delay_seconds,
        }
    }

    #[test]
    fn test_into_notification_uses_clock() {
        let start = Utc::now();
        let clock = ManualClock::new(start);

        let n = params(Some(90)).into_notification(&clock).unwrap();
        assert_eq!(n.status, DeliveryStatus::Pending);
        assert_eq!(n.created_at, start);
        assert_eq!(n.scheduled_at, start + Duration::seconds(90));
        assert_eq!(n.recipient, "user@example.com");
        assert_eq!(n.attempts, 0);
    }

    #[test]
    fn test_into_notification_defaults_to_due_now() {
        let clock = ManualClock::new(Utc::now());
        let n = params(None).into_notification(&clock).unwrap();
        assert!(n.is_due(clock.now()));
    }

    #[test]
    fn test_absolute_time_wins_over_delay() {
        let clock = ManualClock::new(Utc::now());
        let at = clock.now() + Duration::days(2);
        let mut p = params(Some(5));
        p.scheduled_at = Some(at);
        assert_eq!(p.into_notification(&clock).unwrap().scheduled_at, at);
    }

    #[test]
    fn test_rejects_empty_recipient_and_negative_delay() {
        let clock = ManualClock::new(Utc::now());

        let mut empty = params(None);
        empty.recipient = "   ".to_string();
        assert!(matches!(
            empty.into_notification(&clock),
            Err(AppError::Validation(_))
        ));

        assert!(matches!(
            params(Some(-1)).into_notification(&clock),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_delay_beyond_representable_time() {
        let clock = ManualClock::new(Utc::now());
        assert!(matches!(
            params(Some(i64::MAX)).into_notification(&clock),
            Err(AppError::Validation(_))
        ));

        // Fits in a TimeDelta but overflows the resulting DateTime.
        let far = Duration::MAX.num_seconds();
        assert!(matches!(
            params(Some(far)).into_notification(&clock),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_new_notification_deserializes_without_payload() {
        let p: NewNotification =
            serde_json::from_value(serde_json::json!({"recipient": "chat:1"})).unwrap();
        assert_eq!(p.payload, serde_json::Value::Null);
        assert!(p.scheduled_at.is_none());
    }
}
