//! Scheduler configuration.

/// Default number of concurrent build slots.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default attempts per job (1 = no retry).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;

/// Default retention of the job registry.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 10_000;

/// How often a failed job is re-attempted.
///
/// Only engine and export failures are retried. Timed-out and invalid jobs
/// always fail on their first attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never below 1.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const fn none() -> Self {
        Self { max_attempts: 1 }
    }

    /// A policy allowing `max_attempts` attempts in total.
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::attempts(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Configuration for the job scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Build slots running at once.
    pub concurrency: usize,

    /// Retry policy applied to every job.
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Sets the number of slots (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl From<&crate::config::SchedulerSettings> for SchedulerConfig {
    fn from(settings: &crate::config::SchedulerSettings) -> Self {
        Self::default()
            .with_concurrency(settings.concurrency)
            .with_retry(RetryPolicy::attempts(settings.max_attempts))
    }
}
