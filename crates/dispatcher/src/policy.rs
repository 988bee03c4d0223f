use std::time::Duration;

use herald_common::config::AppConfig;

/// What happens to a notification whose delivery fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Leave it pending with no bookkeeping; it is retried every tick forever.
    #[default]
    Unbounded,
    /// Count failures and mark it failed after this many attempts.
    MaxAttempts(u32),
}

impl RetryPolicy {
    pub fn from_max_attempts(max_attempts: Option<u32>) -> Self {
        match max_attempts {
            Some(n) if n > 0 => RetryPolicy::MaxAttempts(n),
            _ => RetryPolicy::Unbounded,
        }
    }
}

/// Tunables for the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Sleep between ticks. Also the only throughput bound: there is no queue depth limit.
    pub interval: Duration,
    pub retry: RetryPolicy,
    /// When set, each notification is claimed for this long before delivery.
    pub claim_lease: Option<chrono::Duration>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            retry: RetryPolicy::Unbounded,
            claim_lease: None,
        }
    }
}

impl From<&AppConfig> for DispatchSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.dispatch_interval_secs),
            retry: RetryPolicy::from_max_attempts(config.dispatch_max_attempts),
            claim_lease: config
                .dispatch_claim_lease_secs
                .map(|secs| chrono::Duration::seconds(secs as i64)),
        }
    }
}
