//! Job identity and build requests.

use crate::catalog::VisualizationMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique job IDs.
static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a build job.
///
/// Auto-generated IDs have the form `job-<n>`; IDs received over the wire are
/// wrapped as-is so unknown ones can be looked up and reported.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a job ID with the given value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a unique auto-generated job ID.
    pub fn auto() -> Self {
        let counter = JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("job-{}", counter))
    }

    /// Returns the string value of this job ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A request to build one (entry, tier, mode) variant.
///
/// Created once by the scheduler or server and consumed exactly once by a
/// worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildJob {
    pub job_id: JobId,
    pub entry_id: String,
    pub tier: String,
    pub mode: VisualizationMode,
    pub submitted_at: DateTime<Utc>,
}

impl BuildJob {
    /// Creates a job with a fresh ID, submitted now.
    pub fn new(
        entry_id: impl Into<String>,
        tier: impl Into<String>,
        mode: VisualizationMode,
    ) -> Self {
        Self {
            job_id: JobId::auto(),
            entry_id: entry_id.into(),
            tier: tier.into(),
            mode,
            submitted_at: Utc::now(),
        }
    }

    /// Short `entry/tier/mode` label for logs.
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.entry_id, self.tier, self.mode)
    }
}
