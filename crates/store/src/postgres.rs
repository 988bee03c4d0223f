//! PostgreSQL-backed notification store.
//!
//! Each unit of work owns one pooled connection for the duration of a tick.
//! Statements run in autocommit mode, so a status update is durable as soon as
//! it returns and a later failure in the same tick cannot undo it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{DeliveryStatus, Notification};

use crate::store::{NotificationStore, UnitOfWork};

#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgUnitOfWork { conn }))
    }
}

/// A dedicated connection checked out for one tick; returned to the pool on drop.
pub struct PgUnitOfWork {
    conn: PoolConnection<Postgres>,
}

impl PgUnitOfWork {
    async fn exists(&mut self, id: Uuid) -> Result<bool, AppError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn find_due(&mut self, now: DateTime<Utc>) -> Result<Vec<Notification>, AppError> {
        let rows: Vec<Notification> = sqlx::query_as(
            r#"
            SELECT *
            FROM notifications
            WHERE status = $1
              AND scheduled_at <= $2
            "#,
        )
        .bind(DeliveryStatus::Pending.to_string())
        .bind(now)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows)
    }

    async fn mark_sent(&mut self, id: Uuid, sent_at: DateTime<Utc>) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $1, sent_at = $2, claimed_until = NULL
            WHERE id = $3 AND status <> $1
            "#,
        )
        .bind(DeliveryStatus::Sent.to_string())
        .bind(sent_at)
        .bind(id)
        .execute(&mut *self.conn)
        .await?;

        // Zero rows is either "already sent" (fine) or "no such row" (not fine).
        if result.rows_affected() == 0 && !self.exists(id).await? {
            return Err(AppError::NotFound(format!("Notification {} not found", id)));
        }

        Ok(())
    }

    async fn record_failure(
        &mut self,
        id: Uuid,
        reason: &str,
        max_attempts: u32,
    ) -> Result<Option<DeliveryStatus>, AppError> {
        let row: Option<(DeliveryStatus,)> = sqlx::query_as(
            r#"
            UPDATE notifications
            SET attempts = attempts + 1,
                last_error = $2,
                claimed_until = NULL,
                status = CASE WHEN attempts + 1 >= $3 THEN $4 ELSE status END
            WHERE id = $1 AND status = $5
            RETURNING status
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(i32::try_from(max_attempts).unwrap_or(i32::MAX))
        .bind(DeliveryStatus::Failed.to_string())
        .bind(DeliveryStatus::Pending.to_string())
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(row.map(|(status,)| status))
    }

    async fn claim(
        &mut self,
        id: Uuid,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET claimed_until = $2
            WHERE id = $1
              AND status = $4
              AND (claimed_until IS NULL OR claimed_until <= $3)
            "#,
        )
        .bind(id)
        .bind(until)
        .bind(now)
        .bind(DeliveryStatus::Pending.to_string())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&mut self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE notifications SET claimed_until = NULL WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(DeliveryStatus::Pending.to_string())
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}
