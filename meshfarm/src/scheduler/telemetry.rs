//! Telemetry for build scheduling.
//!
//! The scheduler emits structured events through a [`TelemetrySink`] and
//! never decides how they are presented. Logging, the job registry and tests
//! are all just sinks.

use crate::jobs::{BuildError, BuildJob, JobId, JobResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Events emitted while a batch runs.
#[derive(Clone, Debug)]
pub enum TelemetryEvent {
    /// A job was accepted and waits for a slot.
    JobQueued { job: BuildJob },

    /// A worker started an attempt.
    JobStarted { job_id: JobId, attempt: u32 },

    /// An attempt failed and the job will be attempted again.
    JobRetrying {
        job_id: JobId,
        attempt: u32,
        error: BuildError,
    },

    /// A job reached a terminal state.
    JobCompleted { result: JobResult },

    /// An entry's manifest was written after all its jobs finished.
    ManifestWritten {
        entry_id: String,
        tiers: usize,
        path: PathBuf,
    },

    /// Every job of a batch finished.
    BatchCompleted {
        jobs: usize,
        succeeded: usize,
        failed: usize,
        duration: Duration,
    },
}

impl TelemetryEvent {
    /// Returns the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::JobQueued { job } => Some(&job.job_id),
            Self::JobStarted { job_id, .. } | Self::JobRetrying { job_id, .. } => Some(job_id),
            Self::JobCompleted { result } => Some(&result.job_id),
            Self::ManifestWritten { .. } | Self::BatchCompleted { .. } => None,
        }
    }

    /// Returns a short name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JobQueued { .. } => "job_queued",
            Self::JobStarted { .. } => "job_started",
            Self::JobRetrying { .. } => "job_retrying",
            Self::JobCompleted { .. } => "job_completed",
            Self::ManifestWritten { .. } => "manifest_written",
            Self::BatchCompleted { .. } => "batch_completed",
        }
    }
}

/// Sink for telemetry events.
///
/// Implementations must be thread-safe and fast; events are emitted from
/// worker tasks.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// No-op sink for when telemetry is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Sink that logs events using the `tracing` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        match &event {
            TelemetryEvent::JobQueued { job } => {
                tracing::debug!(
                    job_id = %job.job_id,
                    entry = %job.entry_id,
                    tier = %job.tier,
                    mode = %job.mode,
                    "Job queued"
                );
            }
            TelemetryEvent::JobStarted { job_id, attempt } => {
                tracing::debug!(job_id = %job_id, attempt, "Job started");
            }
            TelemetryEvent::JobRetrying {
                job_id,
                attempt,
                error,
            } => {
                tracing::warn!(
                    job_id = %job_id,
                    attempt,
                    error = %error,
                    "Job failed, retrying"
                );
            }
            TelemetryEvent::JobCompleted { result } => {
                if result.success {
                    tracing::debug!(
                        job_id = %result.job_id,
                        status = %result.status,
                        duration_ms = result.duration.as_millis() as u64,
                        "Job completed"
                    );
                } else {
                    tracing::warn!(
                        job_id = %result.job_id,
                        entry = %result.entry_id,
                        tier = %result.tier,
                        status = %result.status,
                        error = %result.error_message().unwrap_or_default(),
                        "Job failed"
                    );
                }
            }
            TelemetryEvent::ManifestWritten {
                entry_id,
                tiers,
                path,
            } => {
                tracing::debug!(
                    entry = %entry_id,
                    tiers,
                    path = %path.display(),
                    "Manifest written"
                );
            }
            TelemetryEvent::BatchCompleted {
                jobs,
                succeeded,
                failed,
                duration,
            } => {
                tracing::info!(
                    jobs,
                    succeeded,
                    failed,
                    duration_ms = duration.as_millis() as u64,
                    "Batch completed"
                );
            }
        }
    }
}

/// Sink that forwards events to multiple sinks.
pub struct MultiplexTelemetrySink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl MultiplexTelemetrySink {
    /// Creates a new multiplex sink with the given sinks.
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }

    /// Adds a sink to the multiplex.
    pub fn add_sink(&mut self, sink: Arc<dyn TelemetrySink>) {
        self.sinks.push(sink);
    }
}

impl TelemetrySink for MultiplexTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

impl std::fmt::Debug for MultiplexTelemetrySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexTelemetrySink")
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}
