//! User configuration.
//!
//! Settings are read from an INI file (`~/.meshfarm/config.ini` by default).
//! Missing files, sections and keys fall back to defaults; present but
//! invalid values are rejected with [`ConfigFileError::InvalidValue`].
//!
//! # Example
//!
//! ```ignore
//! use meshfarm::config::ConfigFile;
//!
//! let config = ConfigFile::load()?;
//! println!("{} build slots", config.scheduler.concurrency);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    CatalogSettings, ConfigFile, EngineSettings, LoggingSettings, OptimizerSettings,
    OutputSettings, SchedulerSettings, ServerSettings,
};
