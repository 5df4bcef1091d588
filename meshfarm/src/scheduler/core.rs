//! Bounded-concurrency batch execution.
//!
//! ```text
//!              ┌──────────┐
//!  jobs ──────►│  queue   │──► slot 1 ─┐
//!              │ (mpsc)   │──► slot 2 ─┼──► results (mpsc) ──► collector
//!              └──────────┘──► slot C ─┘                          │
//!                                              per-entry barrier ─┴─► manifest
//! ```
//!
//! C slot tasks pull jobs from a shared queue; a slot admits its next job as
//! soon as the previous one finishes. The collector joins on the known job
//! count and never stops early. When the last job of an entry reaches a
//! terminal state, that entry's manifest is written.

use super::config::SchedulerConfig;
use super::summary::BatchSummary;
use super::telemetry::{TelemetryEvent, TelemetrySink};
use crate::catalog::{CatalogError, CatalogRegistry, VisualizationMode};
use crate::engine::EngineMode;
use crate::export::ExportManager;
use crate::jobs::{BuildError, BuildJob, JobId, JobResult};
use crate::worker::BuildWorker;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Join barrier state for one entry.
#[derive(Debug, Default)]
struct EntryProgress {
    expected: usize,
    finished: usize,
    attempted: BTreeSet<String>,
    succeeded: BTreeSet<String>,
}

/// Dispatches build jobs over a fixed number of slots.
#[derive(Clone)]
pub struct JobScheduler {
    worker: Arc<BuildWorker>,
    config: SchedulerConfig,
    telemetry: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JobScheduler {
    pub fn new(
        worker: BuildWorker,
        config: SchedulerConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            worker: Arc::new(worker),
            config,
            telemetry,
        }
    }

    pub fn catalog(&self) -> &CatalogRegistry {
        self.worker.catalog()
    }

    pub fn exporter(&self) -> &ExportManager {
        self.worker.exporter()
    }

    pub fn engine_mode(&self) -> EngineMode {
        self.worker.engine().mode()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// One job per tier of `entry_id`.
    pub fn jobs_for_entry(
        &self,
        entry_id: &str,
        mode: VisualizationMode,
    ) -> Result<Vec<BuildJob>, CatalogError> {
        let entry = self.catalog().entry(entry_id)?;
        if !entry.supports_mode(mode) {
            return Err(CatalogError::ModeNotSupported {
                entry: entry_id.to_string(),
                mode,
            });
        }
        Ok(entry
            .tiers
            .iter()
            .map(|tier| BuildJob::new(entry_id, tier.as_str(), mode))
            .collect())
    }

    /// One job per (entry, tier) of the whole catalog.
    ///
    /// Entries that do not offer `mode` are skipped.
    pub fn jobs_for_all(&self, mode: VisualizationMode) -> Vec<BuildJob> {
        self.catalog()
            .entries()
            .filter(|entry| entry.supports_mode(mode))
            .flat_map(|entry| {
                entry
                    .tiers
                    .iter()
                    .map(move |tier| BuildJob::new(entry.id.as_str(), tier.as_str(), mode))
            })
            .collect()
    }

    /// Announces jobs before they run, making them visible to status polls.
    pub fn enqueue(&self, jobs: &[BuildJob]) {
        for job in jobs {
            self.telemetry
                .emit(TelemetryEvent::JobQueued { job: job.clone() });
        }
    }

    /// Runs a single job as a batch of one, including its manifest.
    pub async fn run_single(&self, job: BuildJob) -> JobResult {
        let job_id = job.job_id.clone();
        let fallback = job.clone();
        let summary = self.run(vec![job]).await;
        summary
            .result(&job_id)
            .cloned()
            .unwrap_or_else(|| aborted(&fallback, Duration::ZERO))
    }

    /// Runs every job and returns one result per job.
    pub async fn run(&self, jobs: Vec<BuildJob>) -> BatchSummary {
        self.enqueue(&jobs);
        self.run_enqueued(jobs).await
    }

    /// Runs jobs that were already announced with [`enqueue`](Self::enqueue).
    pub async fn run_enqueued(&self, jobs: Vec<BuildJob>) -> BatchSummary {
        let started = Instant::now();
        let total = jobs.len();
        let mut summary = BatchSummary::default();
        if total == 0 {
            return summary;
        }

        let mut progress: HashMap<String, EntryProgress> = HashMap::new();
        let mut outstanding: HashMap<JobId, BuildJob> = HashMap::with_capacity(total);
        for job in &jobs {
            let entry = progress.entry(job.entry_id.clone()).or_default();
            entry.expected += 1;
            entry.attempted.insert(job.tier.clone());
            outstanding.insert(job.job_id.clone(), job.clone());
        }

        let slots = self.config.concurrency.max(1).min(total);
        info!(jobs = total, slots, "Starting batch");

        let (queue_tx, queue_rx) = mpsc::channel::<BuildJob>(total);
        for job in jobs {
            // Capacity equals the job count, so this never waits.
            if queue_tx.send(job).await.is_err() {
                break;
            }
        }
        drop(queue_tx);

        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<JobResult>();
        let mut slot_tasks = JoinSet::new();
        for slot in 0..slots {
            slot_tasks.spawn(run_slot(
                slot,
                Arc::clone(&queue_rx),
                result_tx.clone(),
                Arc::clone(&self.worker),
                self.config.clone(),
                Arc::clone(&self.telemetry),
            ));
        }
        drop(result_tx);

        while summary.total < total {
            let Some(result) = result_rx.recv().await else {
                break;
            };
            if outstanding.remove(&result.job_id).is_none() {
                continue;
            }
            self.collect(result, &mut progress, &mut summary).await;
        }

        // Slots that died leave jobs without a result; fail them explicitly.
        while let Some(joined) = slot_tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Build slot aborted");
            }
        }
        let missing: Vec<BuildJob> = outstanding.into_values().collect();
        for job in missing {
            let result = aborted(&job, started.elapsed());
            self.collect(result, &mut progress, &mut summary).await;
        }

        summary.duration = started.elapsed();
        self.telemetry.emit(TelemetryEvent::BatchCompleted {
            jobs: summary.total,
            succeeded: summary.succeeded,
            failed: summary.unsuccessful(),
            duration: summary.duration,
        });
        summary
    }

    async fn collect(
        &self,
        result: JobResult,
        progress: &mut HashMap<String, EntryProgress>,
        summary: &mut BatchSummary,
    ) {
        self.telemetry.emit(TelemetryEvent::JobCompleted {
            result: result.clone(),
        });

        let entry_id = result.entry_id.clone();
        let entry_done = match progress.get_mut(&entry_id) {
            Some(entry) => {
                entry.finished += 1;
                if result.success {
                    entry.succeeded.insert(result.tier.clone());
                }
                entry.finished == entry.expected
            }
            None => false,
        };
        summary.record(result);

        if entry_done {
            if let Some(entry) = progress.remove(&entry_id) {
                self.write_manifest(&entry_id, entry, summary).await;
            }
        }
    }

    async fn write_manifest(
        &self,
        entry_id: &str,
        progress: EntryProgress,
        summary: &mut BatchSummary,
    ) {
        // Jobs for ids outside the catalog have no manifest to describe.
        let Ok(entry) = self.catalog().entry(entry_id) else {
            debug!(entry = %entry_id, "Skipping manifest for unknown entry");
            return;
        };

        let exporter = self.worker.exporter();
        match exporter
            .write_manifest(entry, &progress.attempted, &progress.succeeded)
            .await
        {
            Ok(manifest) => {
                let path = exporter.manifest_path(entry_id);
                self.telemetry.emit(TelemetryEvent::ManifestWritten {
                    entry_id: entry_id.to_string(),
                    tiers: manifest.tiers.len(),
                    path: path.clone(),
                });
                summary.record_manifest(entry_id, path);
            }
            Err(e) => {
                error!(entry = %entry_id, error = %e, "Failed to write manifest");
                summary
                    .errors
                    .push(format!("manifest for '{entry_id}': {e}"));
            }
        }
    }
}

fn aborted(job: &BuildJob, duration: Duration) -> JobResult {
    JobResult::failed(
        job,
        BuildError::EngineInvocation("build slot aborted before completing the job".into()),
        duration,
        0,
    )
}

async fn run_slot(
    slot: usize,
    queue: Arc<Mutex<mpsc::Receiver<BuildJob>>>,
    results: mpsc::UnboundedSender<JobResult>,
    worker: Arc<BuildWorker>,
    config: SchedulerConfig,
    telemetry: Arc<dyn TelemetrySink>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };
        debug!(slot, job_id = %job.job_id, job = %job.label(), "Slot admitted job");
        let result = execute(&worker, &config, telemetry.as_ref(), &job).await;
        if results.send(result).is_err() {
            break;
        }
    }
}

/// Runs a job under the retry policy.
async fn execute(
    worker: &BuildWorker,
    config: &SchedulerConfig,
    telemetry: &dyn TelemetrySink,
    job: &BuildJob,
) -> JobResult {
    let started = Instant::now();
    let max_attempts = config.retry.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        telemetry.emit(TelemetryEvent::JobStarted {
            job_id: job.job_id.clone(),
            attempt,
        });
        match worker.attempt(job).await {
            Ok(output) => return worker.succeeded(job, output, started.elapsed(), attempt),
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                telemetry.emit(TelemetryEvent::JobRetrying {
                    job_id: job.job_id.clone(),
                    attempt,
                    error,
                });
                attempt += 1;
            }
            Err(error) => return JobResult::failed(job, error, started.elapsed(), attempt),
        }
    }
}
