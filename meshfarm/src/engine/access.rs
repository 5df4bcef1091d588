//! Timed, serialized access to authoring engines.

use super::shared::{EngineCall, SharedEngine};
use super::{
    AuthoringEngine, EngineCommand, EngineError, EngineFactory, KillSwitch, ProcessEngineFactory,
    SimulatedEngineFactory, SimulationPlan,
};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// How engines are provisioned for jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineMode {
    /// One engine process per job.
    #[default]
    Isolated,
    /// One persistent engine behind a single-writer queue.
    Shared,
    /// Per-job in-process simulated engines.
    Simulated,
}

impl EngineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Isolated => "isolated",
            Self::Shared => "shared",
            Self::Simulated => "simulated",
        }
    }
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolated" => Ok(Self::Isolated),
            "shared" => Ok(Self::Shared),
            "simulated" => Ok(Self::Simulated),
            other => Err(format!(
                "unknown engine mode '{other}' (expected isolated, shared or simulated)"
            )),
        }
    }
}

/// Why an engine call produced no value.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The engine could not be launched.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The call exceeded its deadline.
    #[error("engine call timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),

    /// The call ended without a result (panic or stopped actor).
    #[error("engine call aborted before completing")]
    Aborted,
}

#[derive(Clone)]
enum AccessKind {
    Isolated(Arc<dyn EngineFactory>),
    Shared(SharedEngine),
}

/// Entry point for every engine invocation.
///
/// Cheap to clone; clones share the same factory or actor.
#[derive(Clone)]
pub struct EngineAccess {
    kind: AccessKind,
    mode: EngineMode,
}

impl fmt::Debug for EngineAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            AccessKind::Isolated(factory) => format!("isolated({})", factory.describe()),
            AccessKind::Shared(shared) => format!("shared(pending={})", shared.pending()),
        };
        f.debug_struct("EngineAccess")
            .field("mode", &self.mode)
            .field("kind", &kind)
            .finish()
    }
}

impl EngineAccess {
    /// A fresh engine from `factory` for every call.
    pub fn isolated(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            kind: AccessKind::Isolated(factory),
            mode: EngineMode::Isolated,
        }
    }

    /// One engine from `factory`, shared by all calls in FIFO order.
    pub fn shared(factory: Arc<dyn EngineFactory>) -> Result<Self, EngineError> {
        Ok(Self {
            kind: AccessKind::Shared(SharedEngine::start(factory)?),
            mode: EngineMode::Shared,
        })
    }

    /// Isolated simulated engines following `plan`.
    pub fn simulated(plan: SimulationPlan) -> Self {
        Self {
            mode: EngineMode::Simulated,
            ..Self::isolated(Arc::new(SimulatedEngineFactory::new(plan)))
        }
    }

    /// Builds access for a configured mode.
    pub fn from_mode(mode: EngineMode, command: EngineCommand) -> Result<Self, EngineError> {
        let factory: Arc<dyn EngineFactory> = Arc::new(ProcessEngineFactory::new(command));
        match mode {
            EngineMode::Isolated => Ok(Self::isolated(factory)),
            EngineMode::Shared => Self::shared(factory),
            EngineMode::Simulated => Ok(Self::simulated(SimulationPlan::new())),
        }
    }

    /// How engines are provisioned.
    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    /// Returns true when calls share one engine.
    pub fn is_shared(&self) -> bool {
        matches!(self.kind, AccessKind::Shared(_))
    }

    /// Runs `call` against an engine, waiting at most `timeout`.
    ///
    /// In isolated mode a timed-out engine is killed through its
    /// [`KillSwitch`]. In shared mode the call cannot be interrupted: it
    /// keeps the actor busy until it finishes on its own, and only then is
    /// the next queued call admitted.
    pub async fn run<T, F>(&self, timeout: Duration, call: F) -> Result<T, InvocationError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn AuthoringEngine) -> T + Send + 'static,
    {
        match &self.kind {
            AccessKind::Isolated(factory) => run_isolated(Arc::clone(factory), timeout, call).await,
            AccessKind::Shared(shared) => run_shared(shared, timeout, call).await,
        }
    }
}

async fn run_isolated<T, F>(
    factory: Arc<dyn EngineFactory>,
    timeout: Duration,
    call: F,
) -> Result<T, InvocationError>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn AuthoringEngine) -> T + Send + 'static,
{
    let (result_tx, result_rx) = oneshot::channel::<Result<T, EngineError>>();
    let (switch_tx, mut switch_rx) = oneshot::channel::<Option<KillSwitch>>();
    let abandoned = Arc::new(AtomicBool::new(false));
    let worker_abandoned = Arc::clone(&abandoned);

    thread::Builder::new()
        .name("meshfarm-job".to_string())
        .spawn(move || {
            let mut engine = match factory.launch() {
                Ok(engine) => engine,
                Err(e) => {
                    let _ = result_tx.send(Err(e));
                    return;
                }
            };
            let switch = engine.kill_switch();
            let _ = switch_tx.send(switch.clone());
            // The caller may have given up while the engine was starting.
            if worker_abandoned.load(Ordering::SeqCst) {
                if let Some(switch) = switch {
                    switch.trigger();
                }
                return;
            }
            let value = call(engine.as_mut());
            let _ = result_tx.send(Ok(value));
        })
        .map_err(EngineError::from)?;

    match tokio::time::timeout(timeout, result_rx).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(InvocationError::Engine(e)),
        Ok(Err(_)) => Err(InvocationError::Aborted),
        Err(_) => {
            abandoned.store(true, Ordering::SeqCst);
            match switch_rx.try_recv() {
                Ok(Some(switch)) => {
                    debug!(timeout_secs = timeout.as_secs_f64(), "Killing timed-out engine");
                    switch.trigger();
                }
                Ok(None) => {
                    warn!("Timed-out engine has no kill switch, it will run to completion");
                }
                Err(_) => {}
            }
            Err(InvocationError::TimedOut(timeout))
        }
    }
}

async fn run_shared<T, F>(
    shared: &SharedEngine,
    timeout: Duration,
    call: F,
) -> Result<T, InvocationError>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn AuthoringEngine) -> T + Send + 'static,
{
    let (result_tx, result_rx) = oneshot::channel::<Result<T, EngineError>>();
    let boxed: EngineCall = Box::new(move |engine| {
        let _ = result_tx.send(engine.map(call));
    });

    let depth = shared
        .submit(boxed)
        .map_err(|_| InvocationError::Aborted)?;
    debug!(queue_depth = depth, "Queued shared engine call");

    // The deadline covers queueing as well as execution.
    match tokio::time::timeout(timeout, result_rx).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(InvocationError::Engine(e)),
        Ok(Err(_)) => Err(InvocationError::Aborted),
        Err(_) => {
            warn!(
                timeout_secs = timeout.as_secs_f64(),
                pending = shared.pending(),
                "Shared engine call timed out; it keeps the engine busy until it finishes"
            );
            Err(InvocationError::TimedOut(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, Compression, QualityTier, VisualizationMode};
    use crate::engine::{ExportSettings, Fault};
    use std::time::Instant;
    use tempfile::TempDir;

    fn fox() -> CatalogEntry {
        CatalogEntry::new("fox", "Fox", vec!["low".into()], vec![VisualizationMode::Normal])
    }

    fn stall_plan() -> SimulationPlan {
        SimulationPlan::new().with_fault("fox", "low", Fault::Stall(Duration::from_secs(30)))
    }

    fn export_call(
        path: std::path::PathBuf,
    ) -> impl FnOnce(&mut dyn AuthoringEngine) -> Result<(), EngineError> + Send + 'static {
        move |engine| {
            engine.construct(&fox(), VisualizationMode::Normal)?;
            let tier = QualityTier::new("low", 600, 256, Compression::High);
            engine.export(&path, &ExportSettings::for_tier(&tier))
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Shared".parse::<EngineMode>().unwrap(), EngineMode::Shared);
        assert_eq!(EngineMode::default(), EngineMode::Isolated);
        assert!("pooled".parse::<EngineMode>().is_err());
    }

    #[tokio::test]
    async fn test_isolated_call_returns_value() {
        let access = EngineAccess::simulated(SimulationPlan::new());
        let count = access
            .run(Duration::from_secs(5), |engine| {
                engine.construct(&fox(), VisualizationMode::Normal)?;
                engine.triangle_count()
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(count, 12_000);
    }

    #[tokio::test]
    async fn test_isolated_timeout_kills_engine() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fox_low.glb");
        let access = EngineAccess::simulated(stall_plan());

        let started = Instant::now();
        let result = access
            .run(Duration::from_millis(100), export_call(path.clone()))
            .await;
        assert!(matches!(result, Err(InvocationError::TimedOut(_))));
        assert!(started.elapsed() < Duration::from_secs(5));

        // The killed engine never writes its file.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_shared_timeout_leaves_call_running() {
        let factory = Arc::new(SimulatedEngineFactory::new(
            SimulationPlan::new()
                .with_fault("fox", "low", Fault::Stall(Duration::from_millis(300))),
        ));
        let access = EngineAccess::shared(factory).unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fox_low.glb");

        let result = access
            .run(Duration::from_millis(50), export_call(path.clone()))
            .await;
        assert!(matches!(result, Err(InvocationError::TimedOut(_))));

        // The next call queues behind the orphaned one and still succeeds.
        let count = access
            .run(Duration::from_secs(5), |engine| engine.triangle_count())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(count, 12_000);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_launch_failure_is_engine_error() {
        let access = EngineAccess::from_mode(
            EngineMode::Isolated,
            EngineCommand::new("/nonexistent/meshfarm-engine", Vec::new()),
        )
        .unwrap();
        let result = access.run(Duration::from_secs(5), |_| ()).await;
        assert!(matches!(
            result,
            Err(InvocationError::Engine(EngineError::Launch { .. }))
        ));
    }
}
