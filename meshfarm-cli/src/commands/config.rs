//! Configuration management CLI commands.
//!
//! Provides `config path`, `config init` and `config show` for locating,
//! creating and inspecting the INI configuration file.

use std::path::Path;

use clap::Subcommand;
use meshfarm::config::ConfigFile;

use crate::error::CliError;
use crate::runner::{config_path, load_config};

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Write a commented configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration (file values over defaults)
    Show,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, explicit: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(explicit),
        ConfigCommands::Init { force } => run_init(explicit, force),
        ConfigCommands::Show => run_show(explicit),
    }
}

/// Show the configuration file path.
fn run_path(explicit: Option<&Path>) -> Result<(), CliError> {
    let path = config_path(explicit);
    println!("{}", path.display());
    if !path.exists() {
        println!("(not created yet; run 'meshfarm config init')");
    }
    Ok(())
}

/// Write the default configuration file.
fn run_init(explicit: Option<&Path>, force: bool) -> Result<(), CliError> {
    let path = config_path(explicit);
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        )));
    }

    ConfigFile::default().save_to(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Print the effective configuration.
fn run_show(explicit: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(explicit)?;
    print!("{}", config.to_ini_string());
    Ok(())
}
