//! Cancellation signal handed from the process lifecycle to the dispatcher.

use tokio::sync::watch;

/// Create a connected trigger / signal pair.
pub fn channel() -> (Shutdown, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (Shutdown { tx }, ShutdownSignal { rx })
}

/// Owning side. Dropping it counts as triggering shutdown.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Drop for Shutdown {
    fn drop(&mut self) {
        self.tx.send_replace(true);
    }
}

/// Observing side; cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn triggered(&mut self) {
        // An error means the sender is gone, which `Drop` already flagged as shutdown.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_is_observed_by_clones() {
        let (shutdown, signal) = channel();
        let mut other = signal.clone();
        assert!(!signal.is_triggered());

        shutdown.trigger();
        other.triggered().await;
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_drop_counts_as_trigger() {
        let (shutdown, mut signal) = channel();
        drop(shutdown);
        signal.triggered().await;
        assert!(signal.is_triggered());
    }
}
