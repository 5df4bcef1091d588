//! Job outcomes.

use super::{BuildJob, JobId, JobStatus};
use crate::catalog::{CatalogError, VisualizationMode};
use crate::engine::{EngineError, InvocationError};
use crate::export::ExportError;
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a build job failed.
///
/// Every internal failure of a worker is converted into one of these and
/// carried on a [`JobResult`]; nothing propagates past the worker.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum BuildError {
    /// The authoring engine failed or could not be reached.
    #[error("Engine invocation failed: {0}")]
    EngineInvocation(String),

    /// Staging or publishing the output file failed.
    #[error("Export I/O failed: {0}")]
    ExportIo(String),

    /// The job exceeded its deadline (seconds).
    #[error("Timed out after {0}s")]
    TimedOut(u64),

    /// The job names an entry, tier or mode the catalog does not offer.
    #[error("Invalid job: {0}")]
    InvalidJob(String),
}

impl BuildError {
    /// Returns true for timeouts, which are never retried.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    /// Returns true if another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EngineInvocation(_) | Self::ExportIo(_))
    }
}

impl From<CatalogError> for BuildError {
    fn from(e: CatalogError) -> Self {
        Self::InvalidJob(e.to_string())
    }
}

impl From<EngineError> for BuildError {
    fn from(e: EngineError) -> Self {
        Self::EngineInvocation(e.to_string())
    }
}

impl From<ExportError> for BuildError {
    fn from(e: ExportError) -> Self {
        Self::ExportIo(e.to_string())
    }
}

impl From<InvocationError> for BuildError {
    fn from(e: InvocationError) -> Self {
        match e {
            InvocationError::TimedOut(after) => Self::TimedOut(after.as_secs().max(1)),
            other => Self::EngineInvocation(other.to_string()),
        }
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Outcome of one build job. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub entry_id: String,
    pub tier: String,
    pub mode: VisualizationMode,
    pub status: JobStatus,
    pub success: bool,
    /// Published asset path, on success.
    pub output_path: Option<PathBuf>,
    /// Triangle count the optimizer accepted.
    pub triangles: Option<u64>,
    /// Size of the published file in bytes.
    pub file_size: Option<u64>,
    /// Whether the triangle count landed inside the tier's band.
    pub within_budget: Option<bool>,
    pub error: Option<BuildError>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    pub attempts: u32,
}

impl JobResult {
    /// A successful result.
    #[allow(clippy::too_many_arguments)]
    pub fn succeeded(
        job: &BuildJob,
        output_path: PathBuf,
        triangles: u64,
        file_size: u64,
        within_budget: bool,
        duration: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            job_id: job.job_id.clone(),
            entry_id: job.entry_id.clone(),
            tier: job.tier.clone(),
            mode: job.mode,
            status: JobStatus::Succeeded,
            success: true,
            output_path: Some(output_path),
            triangles: Some(triangles),
            file_size: Some(file_size),
            within_budget: Some(within_budget),
            error: None,
            duration,
            attempts,
        }
    }

    /// A failed result. Timeouts are recorded as [`JobStatus::TimedOut`].
    pub fn failed(job: &BuildJob, error: BuildError, duration: Duration, attempts: u32) -> Self {
        let status = if error.is_timeout() {
            JobStatus::TimedOut
        } else {
            JobStatus::Failed
        };
        Self {
            job_id: job.job_id.clone(),
            entry_id: job.entry_id.clone(),
            tier: job.tier.clone(),
            mode: job.mode,
            status,
            success: false,
            output_path: None,
            triangles: None,
            file_size: None,
            within_budget: None,
            error: Some(error),
            duration,
            attempts,
        }
    }

    /// Error text, if failed.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> BuildJob {
        BuildJob::new("fox", "high", VisualizationMode::Normal)
    }

    #[test]
    fn test_timeout_maps_to_timed_out_status() {
        let result = JobResult::failed(
            &job(),
            BuildError::TimedOut(120),
            Duration::from_secs(120),
            1,
        );
        assert_eq!(result.status, JobStatus::TimedOut);
        assert!(!result.success);
    }

    #[test]
    fn test_invocation_timeout_converts() {
        let err: BuildError = InvocationError::TimedOut(Duration::from_millis(300)).into();
        assert_eq!(err, BuildError::TimedOut(1));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_serialized_shape() {
        let result = JobResult::failed(
            &job(),
            BuildError::EngineInvocation("modifier failed".into()),
            Duration::from_millis(1500),
            1,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["error"]["kind"], "engine_invocation");
        assert_eq!(json["error"]["message"], "modifier failed");
        assert!(json["output_path"].is_null());
    }
}
