//! Request dispatch.
//!
//! Every request runs in its own spawned task under a per-kind deadline, so a
//! panicking or stuck handler turns into an error response instead of taking
//! the connection (or the listener) down with it.

use super::health::ServerHealth;
use super::protocol::{ProtocolError, Request, Response};
use super::ServerConfig;
use crate::catalog::VisualizationMode;
use crate::jobs::{BuildError, BuildJob, JobId, JobResult};
use crate::scheduler::{BatchSummary, JobRegistry, JobScheduler};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{debug, error, warn};

enum Guarded<T> {
    Done(T),
    Failed(JoinError),
    TimedOut,
}

/// Runs `task` on its own tokio task, waiting at most `timeout`.
///
/// A task that outlives its deadline is detached, not cancelled.
async fn guarded<T, F>(timeout: Duration, task: F) -> Guarded<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let handle = tokio::spawn(task);
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(value)) => Guarded::Done(value),
        Ok(Err(e)) => Guarded::Failed(e),
        Err(_) => Guarded::TimedOut,
    }
}

fn success<T: Serialize>(value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(result) => Response::success(result),
        Err(e) => Response::error(format!("Failed to encode result: {e}")),
    }
}

fn failure<T: Serialize>(message: impl Into<String>, value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(result) => Response::error_with(message, result),
        Err(e) => Response::error(format!("Failed to encode result: {e}")),
    }
}

#[derive(Serialize)]
struct EntryListing<'a> {
    id: &'a str,
    display_name: &'a str,
    template: &'static str,
    tiers: &'a [String],
    modes: &'a [VisualizationMode],
}

/// Executes parsed requests against the scheduler and registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    scheduler: JobScheduler,
    registry: Arc<JobRegistry>,
    health: Arc<ServerHealth>,
    config: ServerConfig,
}

impl Dispatcher {
    /// `registry` must receive the scheduler's telemetry for `job_status`
    /// to see submitted jobs.
    pub fn new(
        scheduler: JobScheduler,
        registry: Arc<JobRegistry>,
        health: Arc<ServerHealth>,
        config: ServerConfig,
    ) -> Self {
        Self {
            scheduler,
            registry,
            health,
            config,
        }
    }

    pub fn health(&self) -> &Arc<ServerHealth> {
        &self.health
    }

    /// Produces exactly one response for a request.
    pub async fn dispatch(&self, request: Request) -> Response {
        let kind = request.kind();
        let timeout = self.config.timeout_for(&request);
        debug!(kind, timeout_secs = timeout.as_secs(), "Dispatching request");

        match request {
            Request::BuildSingle {
                entry_id,
                tier,
                mode,
            } => self.build_single(entry_id, tier, mode, timeout).await,
            Request::BuildAll { entry_id, mode } => {
                self.build_all(entry_id, mode.unwrap_or_default(), timeout)
                    .await
            }
            Request::JobStatus { job_id } => {
                let registry = Arc::clone(&self.registry);
                let response = self
                    .settle(kind, timeout, async move { job_status(&registry, job_id) })
                    .await;
                if !response.is_success() {
                    self.health.protocol_error();
                }
                response
            }
            Request::HealthCheck => {
                let registry = Arc::clone(&self.registry);
                let health = Arc::clone(&self.health);
                let mode = self.scheduler.engine_mode();
                self.settle(kind, timeout, async move {
                    success(&health.snapshot(mode.as_str(), registry.counts()))
                })
                .await
            }
            Request::ListEntries => {
                let scheduler = self.scheduler.clone();
                self.settle(kind, timeout, async move { list_entries(&scheduler) })
                    .await
            }
        }
    }

    async fn settle<F>(&self, kind: &'static str, timeout: Duration, task: F) -> Response
    where
        F: Future<Output = Response> + Send + 'static,
    {
        match guarded(timeout, task).await {
            Guarded::Done(response) => response,
            Guarded::Failed(e) => self.dispatch_failed(kind, e),
            Guarded::TimedOut => {
                warn!(kind, timeout_secs = timeout.as_secs(), "Request timed out");
                Response::error(format!("{kind} timed out after {}s", timeout.as_secs()))
            }
        }
    }

    fn dispatch_failed(&self, kind: &'static str, e: JoinError) -> Response {
        self.health.dispatch_failed();
        error!(kind, error = %e, "Request handler failed");
        Response::error(format!("{kind} failed: {e}"))
    }

    async fn build_single(
        &self,
        entry_id: String,
        tier: String,
        mode: VisualizationMode,
        timeout: Duration,
    ) -> Response {
        if let Err(e) = self.scheduler.catalog().resolve(&entry_id, &tier, mode) {
            return Response::error(e.to_string());
        }
        let job = BuildJob::new(entry_id, tier, mode);
        self.scheduler.enqueue(std::slice::from_ref(&job));

        let scheduler = self.scheduler.clone();
        let batch = vec![job.clone()];
        match guarded(timeout, async move { scheduler.run_enqueued(batch).await }).await {
            Guarded::Done(summary) => match summary.result(&job.job_id) {
                Some(result) => single_response(result, &summary),
                None => Response::error(format!("No result recorded for {}", job.job_id)),
            },
            Guarded::Failed(e) => self.dispatch_failed("build_single", e),
            Guarded::TimedOut => {
                warn!(
                    job_id = %job.job_id,
                    timeout_secs = timeout.as_secs(),
                    "Build outlived its request; it keeps running in the background"
                );
                let attempts = self
                    .registry
                    .get(&job.job_id)
                    .map(|record| record.attempts)
                    .unwrap_or(0);
                let result = JobResult::failed(
                    &job,
                    BuildError::TimedOut(timeout.as_secs().max(1)),
                    timeout,
                    attempts,
                );
                failure(
                    result.error_message().unwrap_or_default(),
                    &result,
                )
            }
        }
    }

    async fn build_all(
        &self,
        entry_id: Option<String>,
        mode: VisualizationMode,
        timeout: Duration,
    ) -> Response {
        let jobs = match entry_id {
            Some(id) => match self.scheduler.jobs_for_entry(&id, mode) {
                Ok(jobs) => jobs,
                Err(e) => return Response::error(e.to_string()),
            },
            None => self.scheduler.jobs_for_all(mode),
        };
        if jobs.is_empty() {
            return Response::error(format!("No catalog entries support mode '{mode}'"));
        }

        self.scheduler.enqueue(&jobs);
        let job_ids: Vec<JobId> = jobs.iter().map(|job| job.job_id.clone()).collect();

        let scheduler = self.scheduler.clone();
        match guarded(timeout, async move { scheduler.run_enqueued(jobs).await }).await {
            Guarded::Done(summary) if summary.is_success() => success(&summary),
            Guarded::Done(summary) => failure(batch_message(&summary), &summary),
            Guarded::Failed(e) => self.dispatch_failed("build_all", e),
            Guarded::TimedOut => {
                warn!(
                    jobs = job_ids.len(),
                    timeout_secs = timeout.as_secs(),
                    "Batch outlived its request; it keeps running in the background"
                );
                failure(
                    format!(
                        "build_all timed out after {}s; poll job_status for progress",
                        timeout.as_secs()
                    ),
                    &json!({ "status": "timed_out", "job_ids": job_ids }),
                )
            }
        }
    }
}

fn single_response(result: &JobResult, summary: &BatchSummary) -> Response {
    if !result.success {
        return failure(result.error_message().unwrap_or_default(), result);
    }
    if !summary.errors.is_empty() {
        return failure(summary.errors.join("; "), result);
    }
    success(result)
}

fn batch_message(summary: &BatchSummary) -> String {
    let mut message = format!(
        "{} of {} jobs failed",
        summary.unsuccessful(),
        summary.total
    );
    for error in &summary.errors {
        message.push_str("; ");
        message.push_str(error);
    }
    message
}

fn job_status(registry: &JobRegistry, job_id: JobId) -> Response {
    match registry.get(&job_id) {
        Some(record) => success(&json!({
            "job_id": record.job.job_id,
            "entry_id": record.job.entry_id,
            "tier": record.job.tier,
            "mode": record.job.mode,
            "status": record.status,
            "attempts": record.attempts,
            "result": record.result,
        })),
        None => Response::from(ProtocolError::UnknownJob(job_id)),
    }
}

fn list_entries(scheduler: &JobScheduler) -> Response {
    let catalog = scheduler.catalog();
    let entries: Vec<EntryListing<'_>> = catalog
        .entries()
        .map(|entry| EntryListing {
            id: &entry.id,
            display_name: &entry.display_name,
            template: entry.template.as_str(),
            tiers: &entry.tiers,
            modes: &entry.modes,
        })
        .collect();
    let tiers: Vec<_> = catalog.tiers().collect();
    success(&json!({
        "entries": entries,
        "tiers": tiers,
        "modes": VisualizationMode::ALL,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, CatalogRegistry, Compression, QualityTier};
    use crate::engine::{EngineAccess, Fault, SimulationPlan};
    use crate::export::ExportManager;
    use crate::jobs::JobStatus;
    use crate::optimizer::QualityOptimizer;
    use crate::scheduler::{SchedulerConfig, TelemetrySink};
    use crate::worker::BuildWorker;
    use serde_json::Value;
    use tempfile::TempDir;

    fn dispatcher(dir: &TempDir, plan: SimulationPlan, config: ServerConfig) -> Dispatcher {
        let tiers = vec![
            QualityTier::new("low", 600, 256, Compression::High),
            QualityTier::new("high", 6000, 1024, Compression::Low),
        ];
        let entries = vec![CatalogEntry::new(
            "fox",
            "Fox",
            vec!["low".into(), "high".into()],
            vec![VisualizationMode::Normal],
        )];
        let catalog = Arc::new(CatalogRegistry::new(tiers, entries).unwrap());
        let worker = BuildWorker::new(
            catalog,
            EngineAccess::simulated(plan),
            ExportManager::new(dir.path()),
            QualityOptimizer::default(),
            Duration::from_secs(5),
        );
        let registry = Arc::new(JobRegistry::default());
        let scheduler = JobScheduler::new(
            worker,
            SchedulerConfig::default(),
            registry.clone() as Arc<dyn TelemetrySink>,
        );
        Dispatcher::new(scheduler, registry, Arc::new(ServerHealth::new()), config)
    }

    fn build_single(tier: &str) -> Request {
        Request::BuildSingle {
            entry_id: "fox".into(),
            tier: tier.into(),
            mode: VisualizationMode::Normal,
        }
    }

    #[tokio::test]
    async fn test_build_single_then_poll() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(&dir, SimulationPlan::new(), ServerConfig::default());

        let response = d.dispatch(build_single("low")).await;
        assert!(response.is_success(), "{:?}", response.message);
        let result = response.result.unwrap();
        assert_eq!(result["status"], "succeeded");
        assert!(dir.path().join("fox").join("fox_low.glb").exists());
        assert!(dir.path().join("fox").join("fox_manifest.json").exists());

        let job_id: JobId = serde_json::from_value(result["job_id"].clone()).unwrap();
        let status = d.dispatch(Request::JobStatus { job_id }).await;
        assert!(status.is_success());
        assert_eq!(status.result.unwrap()["status"], "succeeded");
    }

    #[tokio::test]
    async fn test_failed_build_is_error_with_result() {
        let dir = TempDir::new().unwrap();
        let plan = SimulationPlan::new().with_fault("fox", "high", Fault::Fail("boom".into()));
        let d = dispatcher(&dir, plan, ServerConfig::default());

        let response = d.dispatch(build_single("high")).await;
        assert!(!response.is_success());
        assert!(response.message.unwrap().contains("boom"));
        assert_eq!(response.result.unwrap()["status"], "failed");
    }

    #[tokio::test]
    async fn test_unknown_tier_is_rejected_without_a_job() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(&dir, SimulationPlan::new(), ServerConfig::default());
        let response = d.dispatch(build_single("ultra")).await;
        assert!(!response.is_success());
        assert!(response.result.is_none());
        assert_eq!(d.registry.len(), 0);
    }

    #[tokio::test]
    async fn test_unknown_job_id() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(&dir, SimulationPlan::new(), ServerConfig::default());
        let response = d
            .dispatch(Request::JobStatus {
                job_id: JobId::new("job-nope"),
            })
            .await;
        assert!(!response.is_success());
        assert_eq!(response.message.as_deref(), Some("Unknown job id 'job-nope'"));
        assert_eq!(d.health().snapshot("x", Default::default()).protocol_errors, 1);
    }

    #[tokio::test]
    async fn test_build_timeout_reports_timed_out_result() {
        let dir = TempDir::new().unwrap();
        let plan =
            SimulationPlan::new().with_fault("fox", "low", Fault::Stall(Duration::from_millis(800)));
        let config = ServerConfig {
            build_timeout: Duration::from_millis(100),
            ..ServerConfig::default()
        };
        let d = dispatcher(&dir, plan, config);

        let response = d.dispatch(build_single("low")).await;
        assert!(!response.is_success());
        let result = response.result.unwrap();
        assert_eq!(result["status"], "timed_out");

        // The build finishes in the background and the registry catches up.
        let job_id: JobId = serde_json::from_value(result["job_id"].clone()).unwrap();
        let mut status = None;
        for _ in 0..50 {
            status = d.registry.status(&job_id);
            if status.is_some_and(|s| s.is_terminal()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(status, Some(JobStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_build_all_partial_failure() {
        let dir = TempDir::new().unwrap();
        let plan = SimulationPlan::new().with_fault("fox", "high", Fault::Fail("boom".into()));
        let d = dispatcher(&dir, plan, ServerConfig::default());

        let response = d
            .dispatch(Request::BuildAll {
                entry_id: None,
                mode: None,
            })
            .await;
        assert!(!response.is_success());
        assert_eq!(response.message.as_deref(), Some("1 of 2 jobs failed"));
        let summary = response.result.unwrap();
        assert_eq!(summary["succeeded"], 1);
        assert_eq!(summary["results"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_build_all_unsupported_mode() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(&dir, SimulationPlan::new(), ServerConfig::default());
        let response = d
            .dispatch(Request::BuildAll {
                entry_id: Some("fox".into()),
                mode: Some(VisualizationMode::Thermal),
            })
            .await;
        assert!(!response.is_success());
        assert!(response.result.is_none());
    }

    #[tokio::test]
    async fn test_health_and_listing() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(&dir, SimulationPlan::new(), ServerConfig::default());

        let health = d.dispatch(Request::HealthCheck).await.result.unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["engine_mode"], "simulated");
        assert!(health["jobs"].is_object());

        let listing = d.dispatch(Request::ListEntries).await.result.unwrap();
        assert_eq!(listing["entries"][0]["id"], "fox");
        assert_eq!(listing["tiers"].as_array().map(Vec::len), Some(2));
        assert_eq!(
            listing["modes"],
            Value::from(vec!["normal", "xray", "ultrasound", "mri", "thermal"])
        );
    }
}
