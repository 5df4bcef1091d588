//! Job lifecycle state.

use serde::{Deserialize, Serialize};

/// Current state of a build job.
///
/// ```text
/// Queued ──► Running ──┬──► Succeeded
///                      ├──► Failed
///                      └──► TimedOut
/// ```
///
/// Terminal states are final.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, waiting for a worker slot.
    #[default]
    Queued,
    /// A worker is building it.
    Running,
    /// Exported and published.
    Succeeded,
    /// Ended with an error.
    Failed,
    /// Exceeded its deadline.
    TimedOut,
}

impl JobStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }

    /// Returns true if the job completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            Self::Queued => next != Self::Queued,
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job totals by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl JobCounts {
    /// Counts one job in `status`.
    pub fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Succeeded => self.succeeded += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::TimedOut => self.timed_out += 1,
        }
    }

    /// Jobs in any state.
    pub fn total(&self) -> usize {
        self.queued + self.running + self.succeeded + self.failed + self.timed_out
    }

    /// Jobs not yet terminal.
    pub fn active(&self) -> usize {
        self.queued + self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::TimedOut.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [JobStatus::Succeeded, JobStatus::Failed, JobStatus::TimedOut] {
            assert!(!terminal.can_transition_to(JobStatus::Running));
            assert!(!terminal.can_transition_to(JobStatus::Succeeded));
        }
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::TimedOut));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&JobStatus::TimedOut).unwrap(),
            "\"timed_out\""
        );
        assert_eq!(JobStatus::TimedOut.to_string(), "timed_out");
    }

    #[test]
    fn test_counts() {
        let mut counts = JobCounts::default();
        counts.record(JobStatus::Running);
        counts.record(JobStatus::Succeeded);
        counts.record(JobStatus::TimedOut);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.active(), 1);
    }
}
