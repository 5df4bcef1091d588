//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and the exit code contract: 0 on success, 1 on any failure.

use std::fmt;
use std::process;

use meshfarm::catalog::CatalogError;
use meshfarm::config::ConfigFileError;
use meshfarm::server::ServerError;
use meshfarm::service::ServiceError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Failed to assemble the pipeline
    ServiceCreation(ServiceError),
    /// Build target could not be planned
    Plan(CatalogError),
    /// At least one build in the batch did not succeed
    BuildFailed {
        unsuccessful: usize,
        total: usize,
        errors: usize,
    },
    /// Job server error
    Serve(ServerError),
    /// Failed to listen for Ctrl+C
    Signal(std::io::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::ServiceCreation(ServiceError::Engine(_)) => {
                eprintln!();
                eprintln!("Check the [engine] section of the configuration:");
                eprintln!("  1. command points at an installed engine executable");
                eprintln!("  2. args load the bridge script, e.g. --python engine_bridge.py");
                eprintln!("  3. or set mode = simulated for a dry run");
            }
            CliError::Plan(CatalogError::UnknownEntry(_)) => {
                eprintln!();
                eprintln!("Run 'meshfarm catalog' to list available entries.");
            }
            CliError::Serve(ServerError::Bind { .. }) => {
                eprintln!();
                eprintln!("Is another job server already running? Try --port.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::ServiceCreation(e) => write!(f, "Failed to create pipeline: {}", e),
            CliError::Plan(e) => write!(f, "Cannot build: {}", e),
            CliError::BuildFailed {
                unsuccessful,
                total,
                errors,
            } => {
                write!(f, "{} of {} builds did not succeed", unsuccessful, total)?;
                if *errors > 0 {
                    write!(f, " ({} manifest error(s))", errors)?;
                }
                Ok(())
            }
            CliError::Serve(e) => write!(f, "Job server error: {}", e),
            CliError::Signal(e) => write!(f, "Failed to install Ctrl+C handler: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Runtime(e) | CliError::Signal(e) => Some(e),
            CliError::ServiceCreation(e) => Some(e),
            CliError::Plan(e) => Some(e),
            CliError::Serve(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::ServiceCreation(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_failure_message() {
        let err = CliError::BuildFailed {
            unsuccessful: 2,
            total: 4,
            errors: 0,
        };
        assert_eq!(err.to_string(), "2 of 4 builds did not succeed");

        let err = CliError::BuildFailed {
            unsuccessful: 0,
            total: 4,
            errors: 1,
        };
        assert_eq!(
            err.to_string(),
            "0 of 4 builds did not succeed (1 manifest error(s))"
        );
    }

    #[test]
    fn test_config_error_conversion() {
        let err: CliError = ConfigFileError::WriteError("disk full".into()).into();
        assert!(matches!(err, CliError::Config(ref m) if m.contains("disk full")));
    }
}
