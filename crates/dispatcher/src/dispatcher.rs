//! Scheduled notification dispatcher.
//!
//! One long-lived task wakes every `interval`, opens a fresh unit of work,
//! loads every due notification and delivers them one at a time. A failed
//! delivery is logged and left for the next tick; it never aborts the batch.
//! A failed store access aborts only the current tick. Shutdown is the only
//! way out of the loop.

use std::sync::Arc;

use herald_common::clock::Clock;
use herald_common::error::AppError;
use herald_common::types::{DeliveryStatus, Notification};
use herald_notifier::{DeliveryChannel, DeliveryError};
use herald_store::{NotificationStore, UnitOfWork};

use crate::policy::{DispatchSettings, RetryPolicy};
use crate::shutdown::ShutdownSignal;

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Notifications returned by the due query.
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
    /// Lost the claim to another dispatcher instance.
    pub skipped: usize,
    /// Left untouched because shutdown was requested mid-batch.
    pub abandoned: usize,
}

impl TickReport {
    /// Delivery attempts actually made.
    pub fn attempted(&self) -> usize {
        self.sent + self.failed
    }
}

pub struct Dispatcher {
    store: Arc<dyn NotificationStore>,
    channel: Arc<dyn DeliveryChannel>,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        channel: Arc<dyn DeliveryChannel>,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            channel,
            clock,
            settings,
        }
    }

    /// Run ticks until `shutdown` fires.
    ///
    /// A shutdown observed during the sleep ends the loop immediately; one
    /// observed mid-tick lets the in-flight delivery finish and skips the rest.
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            channel = self.channel.name(),
            retry = ?self.settings.retry,
            claim_lease_secs = self.settings.claim_lease.map(|l| l.num_seconds()),
            "Notification dispatcher started"
        );

        while !shutdown.is_triggered() {
            match self.tick(&shutdown).await {
                Ok(report) if report.due == 0 => {
                    tracing::debug!("No due notifications");
                }
                Ok(report) => {
                    tracing::info!(
                        due = report.due,
                        sent = report.sent,
                        failed = report.failed,
                        skipped = report.skipped,
                        abandoned = report.abandoned,
                        "Dispatch tick complete"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Dispatch tick failed, retrying next interval");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = shutdown.triggered() => break,
            }
        }

        tracing::info!("Notification dispatcher stopped");
    }

    /// One poll-and-deliver pass.
    ///
    /// Returns `Err` only for store failures; the unit of work is released on
    /// every path when it goes out of scope.
    pub async fn tick(&self, shutdown: &ShutdownSignal) -> Result<TickReport, AppError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let due = uow.find_due(now).await?;

        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };

        for (index, notification) in due.iter().enumerate() {
            if shutdown.is_triggered() {
                report.abandoned = due.len() - index;
                tracing::info!(
                    abandoned = report.abandoned,
                    "Shutdown requested, leaving remaining notifications for later"
                );
                break;
            }

            if !self.claim(uow.as_mut(), notification).await? {
                tracing::debug!(
                    notification_id = %notification.id,
                    "Notification claimed elsewhere, skipping"
                );
                report.skipped += 1;
                continue;
            }

            match self.deliver(notification).await {
                Ok(()) => {
                    uow.mark_sent(notification.id, self.clock.now()).await?;
                    tracing::info!(notification_id = %notification.id, "Notification sent");
                    report.sent += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        notification_id = %notification.id,
                        channel = self.channel.name(),
                        error = %e,
                        "Notification delivery failed"
                    );
                    self.handle_failure(uow.as_mut(), notification, &e).await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Take the multi-instance claim if one is configured; always true otherwise.
    async fn claim(
        &self,
        uow: &mut dyn UnitOfWork,
        notification: &Notification,
    ) -> Result<bool, AppError> {
        match self.settings.claim_lease {
            Some(lease) => {
                let now = self.clock.now();
                uow.claim(notification.id, now + lease, now).await
            }
            None => Ok(true),
        }
    }

    /// Send on a separate task so a panicking channel counts as one failed item.
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryFailure> {
        let channel = Arc::clone(&self.channel);
        let owned = notification.clone();

        match tokio::spawn(async move { channel.send(&owned).await }).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DeliveryFailure::Channel(e)),
            Err(join) => Err(DeliveryFailure::Aborted(join.to_string())),
        }
    }

    async fn handle_failure(
        &self,
        uow: &mut dyn UnitOfWork,
        notification: &Notification,
        error: &DeliveryFailure,
    ) -> Result<(), AppError> {
        match self.settings.retry {
            RetryPolicy::Unbounded => {
                if self.settings.claim_lease.is_some() {
                    uow.release_claim(notification.id).await?;
                }
            }
            RetryPolicy::MaxAttempts(max) => {
                match uow
                    .record_failure(notification.id, &error.to_string(), max)
                    .await?
                {
                    Some(DeliveryStatus::Failed) => {
                        tracing::warn!(
                            notification_id = %notification.id,
                            max_attempts = max,
                            "Notification exhausted its delivery attempts and was marked failed"
                        );
                    }
                    Some(_) => {}
                    None => {
                        tracing::debug!(
                            notification_id = %notification.id,
                            "Notification left pending elsewhere, failure not recorded"
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum DeliveryFailure {
    #[error(transparent)]
    Channel(DeliveryError),

    #[error("delivery task aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempted_counts_sent_and_failed() {
        let report = TickReport {
            due: 5,
            sent: 2,
            failed: 1,
            skipped: 1,
            abandoned: 1,
        };
        assert_eq!(report.attempted(), 3);
    }

    #[test]
    fn test_failure_messages() {
        let channel = DeliveryFailure::Channel(DeliveryError::InvalidRecipient("x".to_string()));
        assert_eq!(channel.to_string(), "invalid recipient: x");

        let aborted = DeliveryFailure::Aborted("task 7 panicked".to_string());
        assert_eq!(aborted.to_string(), "delivery task aborted: task 7 panicked");
    }
}
