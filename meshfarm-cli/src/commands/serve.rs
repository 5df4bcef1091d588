//! Serve command - run the job server until Ctrl+C.

use meshfarm::engine::EngineMode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the serve command.
pub struct ServeArgs {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub engine: Option<EngineMode>,
}

/// Run the serve command.
pub fn run(runner: &CliRunner, args: ServeArgs) -> Result<(), CliError> {
    runner.log_startup("serve");

    // CLI > config
    let mut config = runner.config().clone();
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let runtime = runner.runtime()?;
    runtime.block_on(async {
        let service = runner.create_service(&config, args.engine)?;
        let server = service.bind_server().await.map_err(CliError::Serve)?;
        let address = server.local_addr().map_err(CliError::Serve)?;

        println!("meshfarm job server v{}", meshfarm::VERSION);
        println!("==========================");
        println!();
        println!("Listening:  {}", address);
        println!("Engine:     {}", service.scheduler().engine_mode());
        println!("Entries:    {}", service.catalog().len());
        println!("Output:     {}", config.output.directory.display());
        println!();
        println!("Press Ctrl+C to stop");
        println!();

        let shutdown = CancellationToken::new();
        let mut handle = server.start(shutdown.clone());

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(CliError::Signal)?;
                info!("Ctrl+C received, stopping job server");
                shutdown.cancel();
            }
            // The server only returns on its own when something broke.
            finished = &mut handle => {
                return match finished {
                    Ok(result) => result.map_err(CliError::Serve),
                    Err(e) => Err(CliError::Config(format!("job server task failed: {e}"))),
                };
            }
        }

        match handle.await {
            Ok(result) => result.map_err(CliError::Serve)?,
            Err(e) => warn!(error = %e, "Job server task ended abnormally"),
        }

        println!();
        println!("Job server stopped.");
        Ok(())
    })
}
