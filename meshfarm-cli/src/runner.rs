//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization, panic handling and
//! service creation so command handlers stay small.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use meshfarm::config::ConfigFile;
use meshfarm::engine::EngineMode;
use meshfarm::logging::{init_logging, LoggingGuard};
use meshfarm::panic;
use meshfarm::service::MeshfarmService;
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
}

impl CliRunner {
    /// Loads configuration, then initializes logging and the panic hook.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Explicit config file; `~/.meshfarm/config.ini` when absent
    /// * `debug_mode` - When true, enables debug-level logging regardless of RUST_LOG
    pub fn new(config_path: Option<&Path>, debug_mode: bool) -> Result<Self, CliError> {
        let config = load_config(config_path)?;

        let logging_guard = init_logging(&config.logging.file, debug_mode)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;
        panic::init();

        Ok(Self {
            logging_guard,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("meshfarm v{}", meshfarm::VERSION);
        info!(
            log_file = %self.config.logging.file.display(),
            "meshfarm CLI: {} command",
            command
        );
    }

    /// Multi-threaded runtime for async commands.
    pub fn runtime(&self) -> Result<Runtime, CliError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("meshfarm")
            .build()
            .map_err(CliError::Runtime)
    }

    /// Wires the pipeline, optionally overriding the engine mode.
    ///
    /// Must run inside the runtime: a shared engine is spawned right away.
    pub fn create_service(
        &self,
        config: &ConfigFile,
        engine: Option<EngineMode>,
    ) -> Result<MeshfarmService, CliError> {
        let mut config = config.clone();
        if let Some(mode) = engine {
            config.engine.mode = mode;
        }

        let service = MeshfarmService::from_config(&config)?;

        let registry = Arc::clone(service.registry());
        panic::set_jobs_callback(move || registry.counts());

        info!(engine = %config.engine.mode, "Pipeline created");
        Ok(service)
    }
}

/// Reads an explicit config file, or the default one.
pub fn load_config(config_path: Option<&Path>) -> Result<ConfigFile, CliError> {
    Ok(match config_path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    })
}

/// Config file the CLI operates on.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(meshfarm::config::config_file_path)
}
