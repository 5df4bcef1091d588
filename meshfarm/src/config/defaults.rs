//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `ConfigFile::default()`
//! implementation.

use std::time::Duration;

use super::file::config_directory;
use super::settings::*;
use crate::engine::EngineMode;

// =============================================================================
// Engine
// =============================================================================

/// Default engine executable.
pub const DEFAULT_ENGINE_COMMAND: &str = "blender";

/// Bridge script the default engine command runs, relative to the config dir.
pub const DEFAULT_BRIDGE_SCRIPT: &str = "engine_bridge.py";

/// Default engine deadline per build, in seconds.
///
/// Kept below the server's build timeout so the engine deadline fires first.
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 110;

/// Default engine arguments: headless, running the bridge script.
pub fn default_engine_args() -> Vec<String> {
    let bridge = config_directory().join(DEFAULT_BRIDGE_SCRIPT);
    vec![
        "--background".to_string(),
        "--python".to_string(),
        bridge.to_string_lossy().into_owned(),
        "--".to_string(),
    ]
}

// =============================================================================
// Server
// =============================================================================

pub const DEFAULT_SERVER_BIND: &str = crate::server::DEFAULT_BIND;
pub const DEFAULT_SERVER_PORT: u16 = crate::server::DEFAULT_PORT;
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_STATUS_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Files
// =============================================================================

/// Output directory name under the config directory.
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "exports";

/// Log file name under the config directory.
pub const DEFAULT_LOG_FILE_NAME: &str = "meshfarm.log";

impl Default for ConfigFile {
    fn default() -> Self {
        let config_dir = config_directory();

        Self {
            engine: EngineSettings {
                mode: EngineMode::default(),
                command: DEFAULT_ENGINE_COMMAND.to_string(),
                args: default_engine_args(),
                timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS),
            },
            scheduler: SchedulerSettings {
                concurrency: crate::scheduler::DEFAULT_CONCURRENCY,
                max_attempts: crate::scheduler::DEFAULT_MAX_ATTEMPTS,
            },
            optimizer: OptimizerSettings {
                tolerance: crate::optimizer::DEFAULT_TOLERANCE,
            },
            output: OutputSettings {
                directory: config_dir.join(DEFAULT_OUTPUT_DIR_NAME),
            },
            server: ServerSettings {
                bind: DEFAULT_SERVER_BIND.to_string(),
                port: DEFAULT_SERVER_PORT,
                build_timeout: Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS),
                batch_timeout: Duration::from_secs(DEFAULT_BATCH_TIMEOUT_SECS),
                status_timeout: Duration::from_secs(DEFAULT_STATUS_TIMEOUT_SECS),
            },
            catalog: CatalogSettings::default(),
            logging: LoggingSettings {
                file: config_dir.join(DEFAULT_LOG_FILE_NAME),
            },
        }
    }
}
