//! meshfarm CLI - batch driver and job server.
//!
//! `meshfarm build <entry|all>` exports every tier of the target and exits
//! 0 only when every build and manifest succeeded; `meshfarm serve` runs
//! the line-delimited JSON job server.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use meshfarm::catalog::VisualizationMode;
use meshfarm::engine::EngineMode;
use meshfarm::service::BuildTarget;

use commands::build::BuildArgs;
use commands::config::ConfigCommands;
use commands::serve::ServeArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "meshfarm")]
#[command(version, about = "Tiered 3D asset variant pipeline", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.meshfarm/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging regardless of RUST_LOG
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every tier of one catalog entry, or of all entries
    Build {
        /// Entry id, or `all`
        target: BuildTarget,

        /// Visualization mode to build
        #[arg(long, default_value = "normal")]
        mode: VisualizationMode,

        /// Engine provisioning override (isolated, shared, simulated)
        #[arg(long)]
        engine: Option<EngineMode>,
    },

    /// Run the job server until Ctrl+C
    Serve {
        /// Listen address override
        #[arg(long)]
        bind: Option<String>,

        /// Listen port override
        #[arg(long)]
        port: Option<u16>,

        /// Engine provisioning override (isolated, shared, simulated)
        #[arg(long)]
        engine: Option<EngineMode>,
    },

    /// List catalog entries, quality tiers and modes
    Catalog,

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        e.exit();
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Build {
            target,
            mode,
            engine,
        } => {
            let runner = CliRunner::new(config_path, cli.debug)?;
            commands::build::run(
                &runner,
                BuildArgs {
                    target,
                    mode,
                    engine,
                },
            )
        }
        Commands::Serve { bind, port, engine } => {
            let runner = CliRunner::new(config_path, cli.debug)?;
            commands::serve::run(&runner, ServeArgs { bind, port, engine })
        }
        Commands::Catalog => commands::catalog::run(config_path),
        Commands::Config(command) => commands::config::run(command, config_path),
    }
}
