//! Build jobs and their outcomes.
//!
//! - [`BuildJob`] - one (entry, tier, mode) build request with a unique [`JobId`]
//! - [`JobStatus`] - lifecycle state: `Queued → Running → {Succeeded, Failed, TimedOut}`
//! - [`JobResult`] - immutable outcome of one job, success or failure
//! - [`BuildError`] - typed failure carried by a failed result

mod job;
mod result;
mod status;

pub use job::{BuildJob, JobId};
pub use result::{BuildError, JobResult};
pub use status::{JobCounts, JobStatus};
