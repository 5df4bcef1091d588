//! Job server.
//!
//! A long-lived TCP listener speaking line-delimited JSON (see [`protocol`]).
//! Clients submit builds, poll job status and check health:
//!
//! ```text
//! client ──line──► connection task ──Request──► Dispatcher ──► JobScheduler
//!        ◄─line─── (one response per line) ◄─Response─┘        JobRegistry
//! ```
//!
//! Every connection runs on its own task. A malformed request, a failing job
//! or a panicking handler produces an error response; none of them closes the
//! listener.
//!
//! # Example
//!
//! ```ignore
//! let shutdown = CancellationToken::new();
//! let server = JobServer::bind(&ServerConfig::default(), scheduler, registry).await?;
//! println!("listening on {}", server.local_addr()?);
//! server.run(shutdown).await?;
//! ```

mod connection;
mod dispatch;
mod health;
pub mod protocol;

pub use connection::ConnectionState;
pub use dispatch::Dispatcher;
pub use health::{HealthSnapshot, ServerHealth};
pub use protocol::{ProtocolError, Request, Response, ResponseStatus};

use crate::scheduler::{JobRegistry, JobScheduler};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9876;

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default deadline for `build_single`.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(120);

/// Default deadline for `build_all`.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Default deadline for `job_status`, `health_check` and `list_entries`.
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(30);

/// Shortest request deadline a configuration may set.
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest request deadline a configuration may set.
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest accepted request line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// How long shutdown waits for open connections.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Job server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket I/O error.
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Listener and per-request settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub build_timeout: Duration,
    pub batch_timeout: Duration,
    pub status_timeout: Duration,
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ServerConfig {
    /// `host:port` to listen on.
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Deadline for a request kind.
    pub fn timeout_for(&self, request: &Request) -> Duration {
        match request {
            Request::BuildSingle { .. } => self.build_timeout,
            Request::BuildAll { .. } => self.batch_timeout,
            Request::JobStatus { .. } | Request::HealthCheck | Request::ListEntries => {
                self.status_timeout
            }
        }
    }
}

impl From<&crate::config::ServerSettings> for ServerConfig {
    fn from(settings: &crate::config::ServerSettings) -> Self {
        Self {
            bind: settings.bind.clone(),
            port: settings.port,
            build_timeout: settings.build_timeout,
            batch_timeout: settings.batch_timeout,
            status_timeout: settings.status_timeout,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// A bound job server.
pub struct JobServer {
    listener: TcpListener,
    dispatcher: Dispatcher,
    max_line_length: usize,
}

impl JobServer {
    /// Binds the listener.
    ///
    /// `registry` must be one of the scheduler's telemetry sinks.
    pub async fn bind(
        config: &ServerConfig,
        scheduler: JobScheduler,
        registry: Arc<JobRegistry>,
    ) -> Result<Self, ServerError> {
        let address = config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;

        let dispatcher = Dispatcher::new(
            scheduler,
            registry,
            Arc::new(ServerHealth::new()),
            config.clone(),
        );
        Ok(Self {
            listener,
            dispatcher,
            max_line_length: config.max_line_length,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn health(&self) -> Arc<ServerHealth> {
        Arc::clone(self.dispatcher.health())
    }

    /// Runs the server on a background task.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<Result<(), ServerError>> {
        tokio::spawn(self.run(shutdown))
    }

    /// Accepts connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let local_addr = self.listener.local_addr()?;
        info!(address = %local_addr, "Job server listening");

        let connections = TaskTracker::new();
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Job server shutting down");
                    break;
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(connection::serve(
                            stream,
                            peer,
                            self.dispatcher.clone(),
                            self.max_line_length,
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        // Usually fd exhaustion; back off instead of spinning.
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        connections.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, connections.wait())
            .await
            .is_err()
        {
            warn!(
                open = connections.len(),
                "Connections still busy at shutdown"
            );
        }
        info!("Job server stopped");
        Ok(())
    }
}
