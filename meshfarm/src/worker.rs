//! Builds one exported asset per job.
//!
//! A [`BuildWorker`] turns a [`BuildJob`] into exactly one [`JobResult`]:
//!
//! 1. resolve the entry and tier in the catalog
//! 2. stage a temporary export path next to the final file
//! 3. on the engine: reset, construct, attach markers, apply the material,
//!    optimize toward the tier budget, export to the staged path
//! 4. publish the staged file with an atomic rename
//! 5. assemble the result from the optimizer report and the file size
//!
//! Every failure becomes a failed result; `build` never returns an error.

use crate::catalog::CatalogRegistry;
use crate::engine::{EngineAccess, EngineError, ExportSettings};
use crate::export::ExportManager;
use crate::jobs::{BuildError, BuildJob, JobResult};
use crate::optimizer::{OptimizeReport, QualityOptimizer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default per-invocation engine deadline.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(110);

/// What a successful attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutput {
    pub path: PathBuf,
    pub file_size: u64,
    pub report: OptimizeReport,
}

/// Produces one asset for one (entry, tier, mode).
#[derive(Debug, Clone)]
pub struct BuildWorker {
    catalog: Arc<CatalogRegistry>,
    engine: EngineAccess,
    exporter: ExportManager,
    optimizer: QualityOptimizer,
    timeout: Duration,
}

impl BuildWorker {
    pub fn new(
        catalog: Arc<CatalogRegistry>,
        engine: EngineAccess,
        exporter: ExportManager,
        optimizer: QualityOptimizer,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            engine,
            exporter,
            optimizer,
            timeout,
        }
    }

    pub fn catalog(&self) -> &Arc<CatalogRegistry> {
        &self.catalog
    }

    pub fn exporter(&self) -> &ExportManager {
        &self.exporter
    }

    pub fn engine(&self) -> &EngineAccess {
        &self.engine
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs one attempt and wraps the outcome in a result.
    pub async fn build(&self, job: &BuildJob) -> JobResult {
        let started = Instant::now();
        match self.attempt(job).await {
            Ok(output) => self.succeeded(job, output, started.elapsed(), 1),
            Err(error) => JobResult::failed(job, error, started.elapsed(), 1),
        }
    }

    /// Builds the result for a successful attempt.
    pub(crate) fn succeeded(
        &self,
        job: &BuildJob,
        output: BuildOutput,
        duration: Duration,
        attempts: u32,
    ) -> JobResult {
        JobResult::succeeded(
            job,
            output.path,
            output.report.realized,
            output.file_size,
            output.report.within_budget(),
            duration,
            attempts,
        )
    }

    /// One build attempt.
    pub async fn attempt(&self, job: &BuildJob) -> Result<BuildOutput, BuildError> {
        let started = Instant::now();
        let (entry, tier) = self.catalog.resolve(&job.entry_id, &job.tier, job.mode)?;
        let entry = entry.clone();
        let settings = ExportSettings::for_tier(tier);
        let target = tier.target_triangles;
        let mode = job.mode;
        let optimizer = self.optimizer;

        let staged = self.exporter.stage(&entry.id, &tier.name).await?;
        let export_path = staged.path().to_path_buf();

        debug!(job_id = %job.job_id, job = %job.label(), "Invoking engine");
        let report = self
            .engine
            .run(self.timeout, move |engine| -> Result<OptimizeReport, EngineError> {
                engine.reset()?;
                engine.construct(&entry, mode)?;
                engine.attach_markers(&entry.markers)?;
                engine.apply_material(&entry, mode)?;
                let report = optimizer.optimize(engine, target)?;
                engine.export(&export_path, &settings)?;
                Ok(report)
            })
            .await
            .map_err(BuildError::from)?
            .map_err(BuildError::from)?;

        let published = staged.publish().await?;

        info!(
            job_id = %job.job_id,
            entry = %job.entry_id,
            tier = %job.tier,
            mode = %job.mode,
            triangles = report.realized,
            target,
            file_size = published.size,
            duration_ms = started.elapsed().as_millis() as u64,
            "Build succeeded"
        );
        if !report.within_budget() {
            warn!(
                job_id = %job.job_id,
                realized = report.realized,
                target,
                "Exported outside triangle budget"
            );
        }

        Ok(BuildOutput {
            path: published.path,
            file_size: published.size,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, Compression, QualityTier, VisualizationMode};
    use crate::engine::{glb, Fault, SimulationPlan};
    use crate::jobs::JobStatus;
    use tempfile::TempDir;

    fn catalog() -> Arc<CatalogRegistry> {
        let tiers = vec![
            QualityTier::new("low", 6000, 256, Compression::High),
            QualityTier::new("high", 20_000, 1024, Compression::None),
        ];
        let entries = vec![CatalogEntry::new(
            "fox",
            "Fox",
            vec!["low".into(), "high".into()],
            vec![VisualizationMode::Normal],
        )];
        Arc::new(CatalogRegistry::new(tiers, entries).unwrap())
    }

    fn worker(dir: &TempDir, plan: SimulationPlan) -> BuildWorker {
        BuildWorker::new(
            catalog(),
            EngineAccess::simulated(plan),
            ExportManager::new(dir.path()),
            QualityOptimizer::default(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_successful_build_reports_optimized_count() {
        let dir = TempDir::new().unwrap();
        let worker = worker(&dir, SimulationPlan::new().with_density("fox", 20_000));
        let job = BuildJob::new("fox", "low", VisualizationMode::Normal);

        let result = worker.build(&job).await;

        assert_eq!(result.status, JobStatus::Succeeded);
        assert_eq!(result.triangles, Some(6000));
        assert_eq!(result.within_budget, Some(true));
        let path = result.output_path.clone().unwrap();
        assert_eq!(path, dir.path().join("fox").join("fox_low.glb"));
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(result.file_size, Some(bytes.len() as u64));
        let doc = glb::decode_json(&bytes).unwrap();
        assert_eq!(doc["extras"]["triangles"], 6000);
    }

    #[tokio::test]
    async fn test_engine_failure_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let job = BuildJob::new("fox", "high", VisualizationMode::Normal);

        let good = worker(&dir, SimulationPlan::new()).build(&job).await;
        assert!(good.success);
        let path = good.output_path.unwrap();
        let before = std::fs::read(&path).unwrap();

        let failing = worker(
            &dir,
            SimulationPlan::new().with_fault("fox", "high", Fault::Fail("crash".into())),
        );
        let result = failing.build(&job).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert!(matches!(result.error, Some(BuildError::EngineInvocation(_))));
        assert_eq!(std::fs::read(&path).unwrap(), before);
        // No staging debris left behind.
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_missing_output_is_export_error() {
        let dir = TempDir::new().unwrap();
        let worker = worker(
            &dir,
            SimulationPlan::new().with_fault("fox", "low", Fault::NoOutput),
        );
        let result = worker
            .build(&BuildJob::new("fox", "low", VisualizationMode::Normal))
            .await;
        assert!(matches!(result.error, Some(BuildError::ExportIo(_))));
        assert!(!dir.path().join("fox").join("fox_low.glb").exists());
    }

    #[tokio::test]
    async fn test_unknown_tier_is_invalid_job() {
        let dir = TempDir::new().unwrap();
        let result = worker(&dir, SimulationPlan::new())
            .build(&BuildJob::new("fox", "ultra", VisualizationMode::Normal))
            .await;
        assert!(matches!(result.error, Some(BuildError::InvalidJob(_))));
        assert!(!dir.path().join("fox").exists());
    }

    #[tokio::test]
    async fn test_unsupported_mode_is_invalid_job() {
        let dir = TempDir::new().unwrap();
        let result = worker(&dir, SimulationPlan::new())
            .build(&BuildJob::new("fox", "low", VisualizationMode::Thermal))
            .await;
        assert!(matches!(result.error, Some(BuildError::InvalidJob(_))));
    }

    #[tokio::test]
    async fn test_timeout_becomes_timed_out_result() {
        let dir = TempDir::new().unwrap();
        let worker = BuildWorker::new(
            catalog(),
            EngineAccess::simulated(
                SimulationPlan::new()
                    .with_fault("fox", "low", Fault::Stall(Duration::from_secs(30))),
            ),
            ExportManager::new(dir.path()),
            QualityOptimizer::default(),
            Duration::from_millis(100),
        );
        let result = worker
            .build(&BuildJob::new("fox", "low", VisualizationMode::Normal))
            .await;
        assert_eq!(result.status, JobStatus::TimedOut);
        assert!(result.duration < Duration::from_secs(5));
    }
}
