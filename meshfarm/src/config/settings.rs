//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use crate::engine::{EngineCommand, EngineMode};
use std::path::PathBuf;
use std::time::Duration;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Authoring engine provisioning
    pub engine: EngineSettings,
    /// Batch concurrency and retry
    pub scheduler: SchedulerSettings,
    /// Triangle budget enforcement
    pub optimizer: OptimizerSettings,
    /// Where assets and manifests are written
    pub output: OutputSettings,
    /// Job server listener and timeouts
    pub server: ServerSettings,
    /// Catalog source
    pub catalog: CatalogSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// isolated, shared or simulated
    pub mode: EngineMode,
    /// Engine executable
    pub command: String,
    /// Engine arguments, whitespace separated in the file
    pub args: Vec<String>,
    /// Deadline for one build invocation
    pub timeout: Duration,
}

impl EngineSettings {
    pub fn engine_command(&self) -> EngineCommand {
        EngineCommand::new(self.command.clone(), self.args.clone())
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Builds running at once.
    pub concurrency: usize,
    /// Attempts per job, including the first (1 = no retry).
    pub max_attempts: u32,
}

/// Optimizer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerSettings {
    /// Accepted relative deviation from a tier's triangle target.
    pub tolerance: f64,
}

/// Output configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    /// Root directory; one subdirectory per catalog entry.
    pub directory: PathBuf,
}

/// Job server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
    /// Deadline for `build_single`
    pub build_timeout: Duration,
    /// Deadline for `build_all`
    pub batch_timeout: Duration,
    /// Deadline for status, health and listing requests
    pub status_timeout: Duration,
}

/// Catalog configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogSettings {
    /// JSON catalog replacing the built-in one.
    pub path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}
