//! High-level service facade.
//!
//! Wires the catalog, engine access, exporter, worker, scheduler and job
//! registry from a [`ConfigFile`], so the CLI and embedders deal with one
//! value instead of the component graph.
//!
//! # Example
//!
//! ```ignore
//! use meshfarm::config::ConfigFile;
//! use meshfarm::service::{BuildTarget, MeshfarmService};
//!
//! let service = MeshfarmService::from_config(&ConfigFile::load()?)?;
//! let summary = service.build(&"fox".parse()?, Default::default()).await?;
//! println!("{}", summary.report());
//! ```

use crate::catalog::{CatalogError, CatalogRegistry, VisualizationMode};
use crate::config::ConfigFile;
use crate::engine::{EngineAccess, EngineError};
use crate::export::ExportManager;
use crate::jobs::BuildJob;
use crate::optimizer::QualityOptimizer;
use crate::scheduler::{
    BatchSummary, JobRegistry, JobScheduler, MultiplexTelemetrySink, SchedulerConfig,
    TelemetrySink, TracingTelemetrySink,
};
use crate::server::{JobServer, ServerConfig, ServerError};
use crate::worker::BuildWorker;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors assembling the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// What a batch builds: one entry or the whole catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTarget {
    All,
    Entry(String),
}

impl FromStr for BuildTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("build target must be an entry id or 'all'".to_string()),
            "all" => Ok(Self::All),
            id => Ok(Self::Entry(id.to_string())),
        }
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Entry(id) => f.write_str(id),
        }
    }
}

/// A fully wired pipeline.
#[derive(Debug, Clone)]
pub struct MeshfarmService {
    scheduler: JobScheduler,
    registry: Arc<JobRegistry>,
    server: ServerConfig,
}

impl MeshfarmService {
    /// Builds the service from user configuration.
    ///
    /// Loads the JSON catalog when one is configured, else the built-in one.
    pub fn from_config(config: &ConfigFile) -> Result<Self, ServiceError> {
        let catalog = match &config.catalog.path {
            Some(path) => {
                info!(path = %path.display(), "Loading catalog");
                CatalogRegistry::from_json_file(path)?
            }
            None => CatalogRegistry::builtin(),
        };
        let engine =
            EngineAccess::from_mode(config.engine.mode, config.engine.engine_command())?;
        Ok(Self::new(catalog, engine, config))
    }

    /// Builds the service around an existing catalog and engine.
    pub fn new(catalog: CatalogRegistry, engine: EngineAccess, config: &ConfigFile) -> Self {
        info!(
            entries = catalog.len(),
            engine = %engine.mode(),
            output = %config.output.directory.display(),
            concurrency = config.scheduler.concurrency,
            "Initializing pipeline"
        );

        let worker = BuildWorker::new(
            Arc::new(catalog),
            engine,
            ExportManager::new(config.output.directory.clone()),
            QualityOptimizer::new(config.optimizer.tolerance),
            config.engine.timeout,
        );

        let registry = Arc::new(JobRegistry::default());
        let telemetry = MultiplexTelemetrySink::new(vec![
            Arc::new(TracingTelemetrySink) as Arc<dyn TelemetrySink>,
            Arc::clone(&registry) as Arc<dyn TelemetrySink>,
        ]);
        let scheduler = JobScheduler::new(
            worker,
            SchedulerConfig::from(&config.scheduler),
            Arc::new(telemetry),
        );

        Self {
            scheduler,
            registry,
            server: ServerConfig::from(&config.server),
        }
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    pub fn catalog(&self) -> &CatalogRegistry {
        self.scheduler.catalog()
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn server_config(&self) -> &ServerConfig {
        &self.server
    }

    /// Jobs for a target in one mode.
    pub fn plan(
        &self,
        target: &BuildTarget,
        mode: VisualizationMode,
    ) -> Result<Vec<BuildJob>, CatalogError> {
        match target {
            BuildTarget::All => Ok(self.scheduler.jobs_for_all(mode)),
            BuildTarget::Entry(id) => self.scheduler.jobs_for_entry(id, mode),
        }
    }

    /// Builds a target and waits for every job.
    pub async fn build(
        &self,
        target: &BuildTarget,
        mode: VisualizationMode,
    ) -> Result<BatchSummary, CatalogError> {
        let jobs = self.plan(target, mode)?;
        info!(target = %target, mode = %mode, jobs = jobs.len(), "Building");
        Ok(self.scheduler.run(jobs).await)
    }

    /// Binds a job server over this pipeline.
    pub async fn bind_server(&self) -> Result<JobServer, ServerError> {
        JobServer::bind(
            &self.server,
            self.scheduler.clone(),
            Arc::clone(&self.registry),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineMode, SimulationPlan};
    use tempfile::TempDir;

    fn simulated(dir: &TempDir) -> MeshfarmService {
        let mut config = ConfigFile::default();
        config.output.directory = dir.path().to_path_buf();
        MeshfarmService::new(
            CatalogRegistry::builtin(),
            EngineAccess::simulated(SimulationPlan::new()),
            &config,
        )
    }

    #[test]
    fn test_build_target_parsing() {
        assert_eq!("all".parse::<BuildTarget>().unwrap(), BuildTarget::All);
        assert_eq!(
            "dog".parse::<BuildTarget>().unwrap(),
            BuildTarget::Entry("dog".into())
        );
        assert!("  ".parse::<BuildTarget>().is_err());
    }

    #[test]
    fn test_from_config_with_simulated_engine() {
        let dir = TempDir::new().unwrap();
        let mut config = ConfigFile::default();
        config.engine.mode = EngineMode::Simulated;
        config.output.directory = dir.path().to_path_buf();
        let service = MeshfarmService::from_config(&config).unwrap();
        assert_eq!(service.scheduler().engine_mode(), EngineMode::Simulated);
        assert!(!service.catalog().is_empty());
    }

    #[test]
    fn test_missing_catalog_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut config = ConfigFile::default();
        config.engine.mode = EngineMode::Simulated;
        config.catalog.path = Some(dir.path().join("missing.json"));
        assert!(matches!(
            MeshfarmService::from_config(&config),
            Err(ServiceError::Catalog(_))
        ));
    }

    #[tokio::test]
    async fn test_build_one_entry_updates_registry() {
        let dir = TempDir::new().unwrap();
        let service = simulated(&dir);
        let entry = service.catalog().entries().next().unwrap().id.clone();
        let tiers = service.catalog().entry(&entry).unwrap().tiers.len();

        let summary = service
            .build(&BuildTarget::Entry(entry.clone()), VisualizationMode::Normal)
            .await
            .unwrap();

        assert_eq!(summary.total, tiers);
        assert!(summary.is_success(), "{}", summary.report());
        assert_eq!(service.registry().counts().succeeded, tiers);
        assert!(dir
            .path()
            .join(&entry)
            .join(format!("{entry}_manifest.json"))
            .exists());
    }

    #[tokio::test]
    async fn test_unknown_entry_is_rejected() {
        let dir = TempDir::new().unwrap();
        let service = simulated(&dir);
        assert!(service
            .build(&BuildTarget::Entry("dodo".into()), VisualizationMode::Normal)
            .await
            .is_err());
    }
}
