//! Aggregate batch outcome.

use crate::jobs::{JobResult, JobStatus};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Per-entry outcome of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntrySummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Manifest written for the entry, if any.
    pub manifest: Option<PathBuf>,
}

/// Outcome of one scheduler run.
///
/// Holds exactly one result per submitted job, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub entries: BTreeMap<String, EntrySummary>,
    /// Failures that are not job results, such as manifest write errors.
    pub errors: Vec<String>,
    pub results: Vec<JobResult>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl BatchSummary {
    pub(crate) fn record(&mut self, result: JobResult) {
        self.total += 1;
        let entry = self.entries.entry(result.entry_id.clone()).or_default();
        match result.status {
            JobStatus::Succeeded => {
                self.succeeded += 1;
                entry.succeeded.push(result.tier.clone());
            }
            JobStatus::TimedOut => {
                self.timed_out += 1;
                entry.failed.push(result.tier.clone());
            }
            _ => {
                self.failed += 1;
                entry.failed.push(result.tier.clone());
            }
        }
        self.results.push(result);
    }

    pub(crate) fn record_manifest(&mut self, entry_id: &str, path: PathBuf) {
        self.entries.entry(entry_id.to_string()).or_default().manifest = Some(path);
    }

    /// Jobs that did not succeed, timeouts included.
    pub fn unsuccessful(&self) -> usize {
        self.failed + self.timed_out
    }

    /// Returns true when every job succeeded and every manifest was written.
    pub fn is_success(&self) -> bool {
        self.unsuccessful() == 0 && self.errors.is_empty()
    }

    /// Result for a job, by id.
    pub fn result(&self, job_id: &crate::jobs::JobId) -> Option<&JobResult> {
        self.results.iter().find(|r| &r.job_id == job_id)
    }

    /// Human-readable report, one line per entry plus totals.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (entry, detail) in &self.entries {
            let mut line = format!(
                "{entry}: {} succeeded, {} failed",
                detail.succeeded.len(),
                detail.failed.len()
            );
            if !detail.failed.is_empty() {
                line.push_str(&format!(" ({})", detail.failed.join(", ")));
            }
            out.push_str(&line);
            out.push('\n');
        }
        for result in self.results.iter().filter(|r| !r.success) {
            if let Some(message) = result.error_message() {
                out.push_str(&format!(
                    "  {}/{}: {}\n",
                    result.entry_id, result.tier, message
                ));
            }
        }
        for error in &self.errors {
            out.push_str(&format!("  error: {error}\n"));
        }
        out.push_str(&format!(
            "Total: {}/{} succeeded, {} failed, {} timed out in {:.1}s",
            self.succeeded,
            self.total,
            self.failed,
            self.timed_out,
            self.duration.as_secs_f64()
        ));
        out
    }
}
