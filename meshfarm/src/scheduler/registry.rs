//! Job registry backing status polls.
//!
//! The registry is a [`TelemetrySink`]: it learns about jobs from the same
//! events the scheduler emits for logging, so every scheduled job is visible
//! from the moment it is queued. Lookups are lock-free on the hot path.
//!
//! Retention is bounded. Once more than `capacity` jobs are tracked, the
//! oldest terminal records are evicted; queued and running jobs never are.

use super::telemetry::{TelemetryEvent, TelemetrySink};
use crate::jobs::{BuildJob, JobCounts, JobId, JobResult, JobStatus};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// What the registry knows about one job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job: BuildJob,
    pub status: JobStatus,
    /// Set once the job is terminal.
    pub result: Option<JobResult>,
    /// Attempts started so far.
    pub attempts: u32,
    /// Order in which the record last changed.
    sequence: u64,
}

/// Concurrent job id → record map.
#[derive(Debug)]
pub struct JobRegistry {
    records: DashMap<JobId, JobRecord>,
    capacity: usize,
    sequence: AtomicU64,
}

impl JobRegistry {
    /// Creates a registry retaining roughly `capacity` jobs.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: DashMap::new(),
            capacity: capacity.max(1),
            sequence: AtomicU64::new(0),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns a snapshot of a job's record.
    pub fn get(&self, job_id: &JobId) -> Option<JobRecord> {
        self.records.get(job_id).map(|r| r.clone())
    }

    /// Current status of a job.
    pub fn status(&self, job_id: &JobId) -> Option<JobStatus> {
        self.records.get(job_id).map(|r| r.status)
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no job is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Totals by status.
    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for record in self.records.iter() {
            counts.record(record.status);
        }
        counts
    }

    fn queued(&self, job: &BuildJob) {
        let sequence = self.next_sequence();
        self.records
            .entry(job.job_id.clone())
            .or_insert_with(|| JobRecord {
                job: job.clone(),
                status: JobStatus::Queued,
                result: None,
                attempts: 0,
                sequence,
            });
    }

    fn started(&self, job_id: &JobId, attempt: u32) {
        let sequence = self.next_sequence();
        if let Some(mut record) = self.records.get_mut(job_id) {
            if record.status == JobStatus::Queued || record.status == JobStatus::Running {
                record.status = JobStatus::Running;
                record.attempts = attempt;
                record.sequence = sequence;
            }
        }
    }

    fn completed(&self, result: &JobResult) {
        let sequence = self.next_sequence();
        if let Some(mut record) = self.records.get_mut(&result.job_id) {
            if record.status.can_transition_to(result.status) {
                record.status = result.status;
                record.attempts = result.attempts;
                record.result = Some(result.clone());
                record.sequence = sequence;
            }
        }
        if self.records.len() > self.capacity {
            self.evict();
        }
    }

    fn evict(&self) {
        let excess = self.records.len().saturating_sub(self.capacity);
        let mut terminal: Vec<(u64, JobId)> = self
            .records
            .iter()
            .filter(|r| r.status.is_terminal())
            .map(|r| (r.sequence, r.key().clone()))
            .collect();
        terminal.sort_unstable_by_key(|(sequence, _)| *sequence);
        for (_, job_id) in terminal.into_iter().take(excess) {
            self.records.remove(&job_id);
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(super::config::DEFAULT_REGISTRY_CAPACITY)
    }
}

impl TelemetrySink for JobRegistry {
    fn emit(&self, event: TelemetryEvent) {
        match &event {
            TelemetryEvent::JobQueued { job } => self.queued(job),
            TelemetryEvent::JobStarted { job_id, attempt } => self.started(job_id, *attempt),
            TelemetryEvent::JobCompleted { result } => self.completed(result),
            TelemetryEvent::JobRetrying { .. }
            | TelemetryEvent::ManifestWritten { .. }
            | TelemetryEvent::BatchCompleted { .. } => {}
        }
    }
}
