//! Build command - run one entry or the whole catalog as a batch.

use meshfarm::catalog::VisualizationMode;
use meshfarm::engine::EngineMode;
use meshfarm::scheduler::BatchSummary;
use meshfarm::service::BuildTarget;
use tracing::{info, warn};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the build command.
pub struct BuildArgs {
    pub target: BuildTarget,
    pub mode: VisualizationMode,
    pub engine: Option<EngineMode>,
}

/// Run the build command.
///
/// Prints the batch report and fails when any job or manifest write failed.
pub fn run(runner: &CliRunner, args: BuildArgs) -> Result<(), CliError> {
    runner.log_startup("build");
    let runtime = runner.runtime()?;

    let summary = runtime.block_on(async {
        let service = runner.create_service(runner.config(), args.engine)?;
        let jobs = service.plan(&args.target, args.mode).map_err(CliError::Plan)?;

        println!("meshfarm v{}", meshfarm::VERSION);
        println!(
            "Building {} ({} mode): {} job(s), up to {} at once",
            args.target,
            args.mode,
            jobs.len(),
            service.scheduler().config().concurrency
        );
        println!("Output: {}", runner.config().output.directory.display());
        println!();

        Ok::<_, CliError>(service.scheduler().run(jobs).await)
    })?;

    println!("{}", summary.report());
    conclude(&summary)
}

fn conclude(summary: &BatchSummary) -> Result<(), CliError> {
    if summary.is_success() {
        info!(jobs = summary.total, "Build finished");
        Ok(())
    } else {
        warn!(
            failed = summary.failed,
            timed_out = summary.timed_out,
            errors = summary.errors.len(),
            "Build finished with failures"
        );
        Err(CliError::BuildFailed {
            unsuccessful: summary.unsuccessful(),
            total: summary.total,
            errors: summary.errors.len(),
        })
    }
}
