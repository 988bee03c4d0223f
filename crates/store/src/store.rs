use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{DeliveryStatus, Notification};

/// Source of isolated units of work over the notification table.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Acquire a fresh handle, independent of any request-scoped storage context.
    ///
    /// The handle is released when the returned value is dropped, on every path.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError>;
}

/// Storage operations available to one dispatcher tick.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Every notification with `status = pending AND scheduled_at <= now`.
    ///
    /// Unpaginated and unordered.
    async fn find_due(&mut self, now: DateTime<Utc>) -> Result<Vec<Notification>, AppError>;

    /// Transition to `Sent`. Marking an already-sent notification is a no-op.
    async fn mark_sent(&mut self, id: Uuid, sent_at: DateTime<Utc>) -> Result<(), AppError>;

    /// Count a failed attempt, moving to `Failed` once `max_attempts` is reached.
    ///
    /// Returns the status after the update, or `None` if the row is no longer
    /// pending (for example, delivered by another instance in the meantime).
    async fn record_failure(
        &mut self,
        id: Uuid,
        reason: &str,
        max_attempts: u32,
    ) -> Result<Option<DeliveryStatus>, AppError>;

    /// Take an exclusive delivery claim until `until`.
    ///
    /// Succeeds only if the row is still pending and no unexpired claim exists at `now`.
    async fn claim(
        &mut self,
        id: Uuid,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Drop a claim held on a pending notification so the next tick may retry it.
    async fn release_claim(&mut self, id: Uuid) -> Result<(), AppError>;
}
