//! Single-writer actor over one persistent engine.
//!
//! A dedicated OS thread owns the engine and drains a FIFO queue of boxed
//! calls, so at most one call touches the document at any time. The engine
//! is launched lazily and relaunched if it dies or a call panics.

use super::{AuthoringEngine, EngineError, EngineFactory};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A queued engine call. Receives the engine, or the launch error.
pub(crate) type EngineCall =
    Box<dyn FnOnce(Result<&mut dyn AuthoringEngine, EngineError>) + Send + 'static>;

/// Handle to the engine actor. Dropping every handle stops the actor.
#[derive(Clone)]
pub struct SharedEngine {
    tx: mpsc::UnboundedSender<EngineCall>,
    pending: Arc<AtomicUsize>,
}

impl SharedEngine {
    /// Starts the actor thread. The engine itself is launched on first use.
    pub fn start(factory: Arc<dyn EngineFactory>) -> Result<Self, EngineError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let actor_pending = Arc::clone(&pending);

        thread::Builder::new()
            .name("meshfarm-engine".to_string())
            .spawn(move || run_actor(factory, rx, actor_pending))?;

        Ok(Self { tx, pending })
    }

    /// Queues a call. Returns the call back if the actor has stopped.
    pub(crate) fn submit(&self, call: EngineCall) -> Result<usize, EngineCall> {
        let depth = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        match self.tx.send(call) {
            Ok(()) => Ok(depth),
            Err(mpsc::error::SendError(call)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Err(call)
            }
        }
    }

    /// Calls queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

fn run_actor(
    factory: Arc<dyn EngineFactory>,
    mut rx: mpsc::UnboundedReceiver<EngineCall>,
    pending: Arc<AtomicUsize>,
) {
    let mut engine: Option<Box<dyn AuthoringEngine>> = None;
    info!(engine = %factory.describe(), "Shared engine actor started");

    while let Some(call) = rx.blocking_recv() {
        if engine.as_mut().is_some_and(|e| !e.is_alive()) {
            warn!("Shared engine died, relaunching on next call");
            engine = None;
        }

        if engine.is_none() {
            match factory.launch() {
                Ok(launched) => {
                    debug!("Shared engine launched");
                    engine = Some(launched);
                }
                Err(e) => {
                    error!(error = %e, "Failed to launch shared engine");
                    call(Err(e));
                    pending.fetch_sub(1, Ordering::SeqCst);
                    continue;
                }
            }
        }

        if let Some(current) = engine.as_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| call(Ok(current.as_mut()))));
            if outcome.is_err() {
                // Document state is unknown after a panic.
                error!("Engine call panicked, discarding shared engine");
                engine = None;
            }
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }

    info!("Shared engine actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, VisualizationMode};
    use crate::engine::{SimulatedEngineFactory, SimulationPlan};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn fox() -> CatalogEntry {
        CatalogEntry::new("fox", "Fox", vec!["low".into()], vec![VisualizationMode::Normal])
    }

    #[tokio::test]
    async fn test_calls_run_in_fifo_order() {
        let factory = Arc::new(SimulatedEngineFactory::new(SimulationPlan::new()));
        let shared = SharedEngine::start(factory).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut receivers = Vec::new();
        for i in 0..5 {
            let (tx, rx) = oneshot::channel();
            let order = Arc::clone(&order);
            let call: EngineCall = Box::new(move |engine| {
                assert!(engine.is_ok());
                std::thread::sleep(Duration::from_millis(5));
                order.lock().unwrap().push(i);
                let _ = tx.send(());
            });
            assert!(shared.submit(call).is_ok());
            receivers.push(rx);
        }
        for rx in receivers {
            rx.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_document_persists_between_calls() {
        let factory = Arc::new(SimulatedEngineFactory::new(SimulationPlan::new()));
        let shared = SharedEngine::start(factory).unwrap();

        let (tx, rx) = oneshot::channel();
        let call: EngineCall = Box::new(move |engine| {
            let result = engine.and_then(|e| e.construct(&fox(), VisualizationMode::Normal));
            let _ = tx.send(result.is_ok());
        });
        assert!(shared.submit(call).is_ok());
        assert!(rx.await.unwrap());

        let (tx, rx) = oneshot::channel();
        let call: EngineCall = Box::new(move |engine| {
            let _ = tx.send(engine.and_then(|e| e.triangle_count()).ok());
        });
        assert!(shared.submit(call).is_ok());
        assert_eq!(rx.await.unwrap(), Some(12_000));
    }

    #[tokio::test]
    async fn test_panicking_call_does_not_stop_actor() {
        let factory = Arc::new(SimulatedEngineFactory::new(SimulationPlan::new()));
        let shared = SharedEngine::start(factory).unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let call: EngineCall = Box::new(move |_engine| {
            let _keep = tx;
            panic!("bridge bug");
        });
        assert!(shared.submit(call).is_ok());
        assert!(rx.await.is_err());

        let (tx, rx) = oneshot::channel();
        let call: EngineCall = Box::new(move |engine| {
            let _ = tx.send(engine.is_ok());
        });
        assert!(shared.submit(call).is_ok());
        assert!(rx.await.unwrap());
    }
}
