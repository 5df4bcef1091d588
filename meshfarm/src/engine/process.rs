//! External engine process driven over a JSON-lines bridge.
//!
//! The engine command is started in its own process group with piped stdio.
//! Each call writes one request line to stdin and reads one response line
//! from stdout:
//!
//! ```text
//! → {"op": "simplify", "ratio": 0.3}
//! ← {"ok": true, "value": null}
//! → {"op": "triangle_count"}
//! ← {"ok": true, "value": 6012}
//! → {"op": "export", "path": "...", "settings": {...}}
//! ← {"ok": false, "error": "disk full"}
//! ```
//!
//! Everything the engine prints to stderr is forwarded to `tracing`.

use super::{AuthoringEngine, EngineError, EngineFactory, ExportSettings, KillSwitch};
use crate::catalog::{AnatomyMarker, CatalogEntry, VisualizationMode};
use crate::optimizer::MeshDensity;
use crate::panic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Program and arguments used to start an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EngineCommand {
    /// Creates a command.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeRequest<'a> {
    Reset,
    Construct {
        entry: &'a CatalogEntry,
        mode: VisualizationMode,
    },
    AttachMarkers {
        markers: &'a [AnatomyMarker],
    },
    ApplyMaterial {
        entry_id: &'a str,
        colors: &'a [String],
        mode: VisualizationMode,
    },
    TriangleCount,
    Simplify {
        ratio: f64,
    },
    Subdivide,
    Export {
        path: &'a Path,
        settings: &'a ExportSettings,
    },
    Quit,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

/// How long a dropped engine may take to exit after `quit`.
pub const QUIT_GRACE: Duration = Duration::from_millis(500);

const QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Engine running as a child process.
pub struct ProcessEngine {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    pgid: i32,
    line: String,
    /// Set once the child has been waited on; its pgid may be reused after.
    reaped: bool,
}

impl ProcessEngine {
    /// Starts the engine in a new process group.
    pub fn spawn(command: &EngineCommand) -> Result<Self, EngineError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|source| EngineError::Launch {
                command: command.display(),
                source,
            })?;

        // With process_group(0) the group id equals the child's pid.
        let pgid = child.id() as i32;
        panic::register_engine_group(pgid);

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            panic::unregister_engine_group(pgid);
            return Err(EngineError::Protocol("engine stdio not captured".into()));
        };

        if let Some(stderr) = child.stderr.take() {
            let name = format!("engine-stderr-{pgid}");
            let forwarded = thread::Builder::new().name(name).spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!(target: "meshfarm::engine::stderr", pgid, "{}", line);
                }
            });
            if let Err(e) = forwarded {
                warn!(pgid, error = %e, "Failed to start engine stderr forwarder");
            }
        }

        debug!(pgid, command = %command.display(), "Engine process started");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            pgid,
            line: String::new(),
            reaped: false,
        })
    }

    /// Collects the child's exit status if it has exited.
    fn try_reap(&mut self) -> bool {
        if !self.reaped {
            self.reaped = matches!(self.child.try_wait(), Ok(Some(_)));
        }
        self.reaped
    }

    /// Asks the engine to quit and waits up to `grace` for it to exit.
    fn quit(&mut self, grace: Duration) -> bool {
        if self.try_reap() {
            return true;
        }
        if let Ok(mut payload) = serde_json::to_vec(&BridgeRequest::Quit) {
            payload.push(b'\n');
            let _ = self.stdin.write_all(&payload);
            let _ = self.stdin.flush();
        }

        let deadline = Instant::now() + grace;
        while !self.try_reap() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(QUIT_POLL_INTERVAL);
        }
        true
    }

    /// Process group id of the engine.
    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    fn call(&mut self, request: &BridgeRequest<'_>) -> Result<Value, EngineError> {
        let mut payload =
            serde_json::to_vec(request).map_err(|e| EngineError::Protocol(e.to_string()))?;
        payload.push(b'\n');
        self.stdin.write_all(&payload).map_err(map_pipe_error)?;
        self.stdin.flush().map_err(map_pipe_error)?;

        self.line.clear();
        let read = self.stdout.read_line(&mut self.line)?;
        if read == 0 {
            return Err(EngineError::Terminated);
        }
        trace!(pgid = self.pgid, response = %self.line.trim_end(), "Bridge response");

        let response: BridgeResponse = serde_json::from_str(self.line.trim_end())
            .map_err(|e| EngineError::Protocol(format!("{e}: {}", self.line.trim_end())))?;

        if response.ok {
            Ok(response.value)
        } else {
            Err(EngineError::Command(
                response
                    .error
                    .unwrap_or_else(|| "engine reported failure".to_string()),
            ))
        }
    }
}

fn map_pipe_error(e: std::io::Error) -> EngineError {
    if e.kind() == std::io::ErrorKind::BrokenPipe {
        EngineError::Terminated
    } else {
        EngineError::Io(e)
    }
}

impl MeshDensity for ProcessEngine {
    fn triangle_count(&mut self) -> Result<u64, EngineError> {
        let value = self.call(&BridgeRequest::TriangleCount)?;
        value
            .as_u64()
            .ok_or_else(|| EngineError::Protocol(format!("triangle count is not a number: {value}")))
    }

    fn simplify(&mut self, ratio: f64) -> Result<(), EngineError> {
        self.call(&BridgeRequest::Simplify { ratio }).map(drop)
    }

    fn subdivide(&mut self) -> Result<(), EngineError> {
        self.call(&BridgeRequest::Subdivide).map(drop)
    }
}

impl AuthoringEngine for ProcessEngine {
    fn reset(&mut self) -> Result<(), EngineError> {
        self.call(&BridgeRequest::Reset).map(drop)
    }

    fn construct(
        &mut self,
        entry: &CatalogEntry,
        mode: VisualizationMode,
    ) -> Result<(), EngineError> {
        self.call(&BridgeRequest::Construct { entry, mode }).map(drop)
    }

    fn attach_markers(&mut self, markers: &[AnatomyMarker]) -> Result<(), EngineError> {
        self.call(&BridgeRequest::AttachMarkers { markers }).map(drop)
    }

    fn apply_material(
        &mut self,
        entry: &CatalogEntry,
        mode: VisualizationMode,
    ) -> Result<(), EngineError> {
        self.call(&BridgeRequest::ApplyMaterial {
            entry_id: &entry.id,
            colors: &entry.colors,
            mode,
        })
        .map(drop)
    }

    fn export(&mut self, path: &Path, settings: &ExportSettings) -> Result<(), EngineError> {
        self.call(&BridgeRequest::Export { path, settings })
            .map(drop)
    }

    fn kill_switch(&self) -> Option<KillSwitch> {
        Some(KillSwitch::ProcessGroup(self.pgid))
    }

    fn is_alive(&mut self) -> bool {
        !self.try_reap()
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        let graceful = self.quit(QUIT_GRACE);
        // Only signal a group whose leader is still unreaped.
        if !graceful {
            super::kill::kill_process_group(self.pgid);
            let _ = self.child.wait();
            self.reaped = true;
        }
        panic::unregister_engine_group(self.pgid);
        debug!(pgid = self.pgid, graceful, "Engine process stopped");
    }
}

/// Launches a [`ProcessEngine`] per request.
#[derive(Debug, Clone)]
pub struct ProcessEngineFactory {
    command: EngineCommand,
}

impl ProcessEngineFactory {
    /// Creates a factory for `command`.
    pub fn new(command: EngineCommand) -> Self {
        Self { command }
    }
}

impl EngineFactory for ProcessEngineFactory {
    fn launch(&self) -> Result<Box<dyn AuthoringEngine>, EngineError> {
        Ok(Box::new(ProcessEngine::spawn(&self.command)?))
    }

    fn describe(&self) -> String {
        self.command.display()
    }
}
