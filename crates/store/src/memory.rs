//! In-process notification store.
//!
//! Used by tests and local runs without PostgreSQL. Every unit of work shares
//! the same table; a single mutex gives the per-row atomicity the database
//! would otherwise provide.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{DeliveryStatus, Notification};

use crate::store::{NotificationStore, UnitOfWork};

#[derive(Default)]
struct Inner {
    rows: Mutex<HashMap<Uuid, Notification>>,
    unavailable: AtomicBool,
    opened: AtomicUsize,
    open: AtomicUsize,
}

impl Inner {
    fn rows(&self) -> MutexGuard<'_, HashMap<Uuid, Notification>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationStore {
    inner: Arc<Inner>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row.
    pub fn insert(&self, notification: Notification) {
        self.inner.rows().insert(notification.id, notification);
    }

    pub fn get(&self, id: Uuid) -> Option<Notification> {
        self.inner.rows().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.inner.rows().values().cloned().collect()
    }

    /// Simulate an unreachable backend: every operation fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Units of work handed out so far.
    pub fn units_opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    /// Units of work not yet dropped.
    pub fn units_open(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        self.inner.check_available()?;
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryUnitOfWork {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct InMemoryUnitOfWork {
    inner: Arc<Inner>,
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        self.inner.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn find_due(&mut self, now: DateTime<Utc>) -> Result<Vec<Notification>, AppError> {
        self.inner.check_available()?;
        Ok(self
            .inner
            .rows()
            .values()
            .filter(|n| n.is_due(now))
            .cloned()
            .collect())
    }

    async fn mark_sent(&mut self, id: Uuid, sent_at: DateTime<Utc>) -> Result<(), AppError> {
        self.inner.check_available()?;
        let mut rows = self.inner.rows();
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;

        if row.status != DeliveryStatus::Sent {
            row.status = DeliveryStatus::Sent;
            row.sent_at = Some(sent_at);
            row.claimed_until = None;
        }
        Ok(())
    }

    async fn record_failure(
        &mut self,
        id: Uuid,
        reason: &str,
        max_attempts: u32,
    ) -> Result<Option<DeliveryStatus>, AppError> {
        self.inner.check_available()?;
        let mut rows = self.inner.rows();
        let Some(row) = rows
            .get_mut(&id)
            .filter(|n| n.status == DeliveryStatus::Pending)
        else {
            return Ok(None);
        };

        // Same saturation as the i32 column in PostgreSQL.
        let cap = i32::try_from(max_attempts).unwrap_or(i32::MAX);
        row.attempts = row.attempts.saturating_add(1);
        row.last_error = Some(reason.to_string());
        row.claimed_until = None;
        if row.attempts >= cap {
            row.status = DeliveryStatus::Failed;
        }
        Ok(Some(row.status))
    }

    async fn claim(
        &mut self,
        id: Uuid,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.inner.check_available()?;
        let mut rows = self.inner.rows();
        match rows.get_mut(&id) {
            Some(row)
                if row.status == DeliveryStatus::Pending
                    && row.claimed_until.is_none_or(|c| c <= now) =>
            {
                row.claimed_until = Some(until);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_claim(&mut self, id: Uuid) -> Result<(), AppError> {
        self.inner.check_available()?;
        if let Some(row) = self.inner.rows().get_mut(&id)
            && row.status == DeliveryStatus::Pending
        {
            row.claimed_until = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending(scheduled_at: DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient: "chat:42".to_string(),
            payload: serde_json::json!({"text": "hi"}),
            status: DeliveryStatus::Pending,
            scheduled_at,
            attempts: 0,
            last_error: None,
            claimed_until: None,
            sent_at: None,
            created_at: scheduled_at,
        }
    }

    #[tokio::test]
    async fn test_find_due_selects_only_pending_and_past() {
        let store = InMemoryNotificationStore::new();
        let now = Utc::now();

        let due = pending(now - Duration::seconds(1));
        let future = pending(now + Duration::seconds(10));
        let mut sent = pending(now - Duration::hours(1));
        sent.status = DeliveryStatus::Sent;
        let mut failed = pending(now - Duration::hours(1));
        failed.status = DeliveryStatus::Failed;

        for n in [&due, &future, &sent, &failed] {
            store.insert(n.clone());
        }

        let mut uow = store.begin().await.unwrap();
        let found = uow.find_due(now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn test_mark_sent_is_idempotent() {
        let store = InMemoryNotificationStore::new();
        let now = Utc::now();
        let n = pending(now);
        store.insert(n.clone());

        let mut uow = store.begin().await.unwrap();
        uow.mark_sent(n.id, now).await.unwrap();
        uow.mark_sent(n.id, now + Duration::minutes(5)).await.unwrap();

        let row = store.get(n.id).unwrap();
        assert_eq!(row.status, DeliveryStatus::Sent);
        assert_eq!(row.sent_at, Some(now));
    }

    #[tokio::test]
    async fn test_mark_sent_unknown_id_is_not_found() {
        let store = InMemoryNotificationStore::new();
        let mut uow = store.begin().await.unwrap();
        let err = uow.mark_sent(Uuid::new_v4(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_record_failure_reaches_failed_at_cap() {
        let store = InMemoryNotificationStore::new();
        let n = pending(Utc::now());
        store.insert(n.clone());

        let mut uow = store.begin().await.unwrap();
        assert_eq!(
            uow.record_failure(n.id, "timeout", 2).await.unwrap(),
            Some(DeliveryStatus::Pending)
        );
        assert_eq!(
            uow.record_failure(n.id, "timeout again", 2).await.unwrap(),
            Some(DeliveryStatus::Failed)
        );

        let row = store.get(n.id).unwrap();
        assert_eq!(row.attempts, 2);
        assert_eq!(row.last_error.as_deref(), Some("timeout again"));
        assert_eq!(uow.record_failure(n.id, "late", 2).await.unwrap(), None);
        assert_eq!(store.get(n.id).unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_record_failure_on_sent_or_missing_row_is_none() {
        let store = InMemoryNotificationStore::new();
        let mut n = pending(Utc::now());
        n.status = DeliveryStatus::Sent;
        store.insert(n.clone());

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.record_failure(n.id, "late", 3).await.unwrap(), None);
        assert_eq!(store.get(n.id).unwrap().status, DeliveryStatus::Sent);
        assert_eq!(store.get(n.id).unwrap().attempts, 0);
        assert_eq!(
            uow.record_failure(Uuid::new_v4(), "gone", 3).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_record_failure_with_huge_cap_stays_pending() {
        let store = InMemoryNotificationStore::new();
        let n = pending(Utc::now());
        store.insert(n.clone());

        let mut uow = store.begin().await.unwrap();
        assert_eq!(
            uow.record_failure(n.id, "timeout", u32::MAX).await.unwrap(),
            Some(DeliveryStatus::Pending)
        );
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_until_expiry() {
        let store = InMemoryNotificationStore::new();
        let now = Utc::now();
        let n = pending(now);
        store.insert(n.clone());

        let mut a = store.begin().await.unwrap();
        let mut b = store.begin().await.unwrap();
        let lease = now + Duration::seconds(60);

        assert!(a.claim(n.id, lease, now).await.unwrap());
        assert!(!b.claim(n.id, lease, now).await.unwrap());
        assert!(b.claim(n.id, lease + Duration::seconds(60), lease).await.unwrap());

        b.release_claim(n.id).await.unwrap();
        assert_eq!(store.get(n.id).unwrap().claimed_until, None);
    }

    #[tokio::test]
    async fn test_units_released_on_drop() {
        let store = InMemoryNotificationStore::new();
        {
            let _uow = store.begin().await.unwrap();
            assert_eq!(store.units_open(), 1);
        }
        assert_eq!(store.units_open(), 0);
        assert_eq!(store.units_opened(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_begin() {
        let store = InMemoryNotificationStore::new();
        store.set_unavailable(true);
        let err = store.begin().await.err().unwrap();
        assert!(err.is_store_failure());
    }
}
