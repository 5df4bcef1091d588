//! Access to the external content-authoring engine.
//!
//! The engine is a stateful, non-thread-safe collaborator: it holds one
//! mutable document and is driven through the synchronous
//! [`AuthoringEngine`] trait. Nothing in the pipeline touches an engine
//! directly; every invocation goes through [`EngineAccess`], which enforces
//! the single-writer rule in one of two ways:
//!
//! - **isolated**: a fresh engine per job, on its own thread, terminated via
//!   its [`KillSwitch`] when the job times out
//! - **shared**: one persistent engine owned by a [`SharedEngine`] actor that
//!   runs jobs one at a time in submission order
//!
//! Implementations:
//!
//! - [`ProcessEngine`] - external process speaking the JSON-lines bridge
//! - [`SimulatedEngine`] - deterministic in-process engine for dry runs

mod access;
pub mod glb;
mod kill;
mod process;
mod shared;
mod simulated;

pub use access::{EngineAccess, EngineMode, InvocationError};
pub(crate) use kill::kill_process_group;
pub use kill::KillSwitch;
pub use process::{EngineCommand, ProcessEngine, ProcessEngineFactory};
pub use shared::SharedEngine;
pub use simulated::{Fault, SimulatedEngine, SimulatedEngineFactory, SimulationPlan};

use crate::catalog::{AnatomyMarker, CatalogEntry, Quantization, QualityTier, VisualizationMode};
use crate::optimizer::MeshDensity;
use serde::Serialize;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors raised by an authoring engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine process could not be started.
    #[error("failed to launch engine `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The engine rejected or failed a command.
    #[error("engine command failed: {0}")]
    Command(String),

    /// The engine answered with something that is not a bridge response.
    #[error("engine bridge protocol error: {0}")]
    Protocol(String),

    /// The engine was terminated or exited mid-conversation.
    #[error("engine terminated")]
    Terminated,

    /// I/O failure talking to the engine.
    #[error("engine I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Tier settings handed to the engine's exporter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSettings {
    /// Tier name.
    pub tier: String,
    /// Texture edge length in pixels.
    pub texture_size: u32,
    /// Mesh quantization, `None` when compression is disabled.
    pub quantization: Option<Quantization>,
    /// Whether hidden marker points are included in the export.
    pub export_markers: bool,
}

impl ExportSettings {
    /// Export settings for a tier.
    pub fn for_tier(tier: &QualityTier) -> Self {
        Self {
            tier: tier.name.clone(),
            texture_size: tier.texture_size,
            quantization: tier.compression.quantization(),
            export_markers: true,
        }
    }
}

/// The authoring engine collaborator.
///
/// All methods take `&mut self`: an engine holds exactly one document and
/// must never be driven by two callers at once.
pub trait AuthoringEngine: MeshDensity + Send {
    /// Clears the current document.
    fn reset(&mut self) -> Result<(), EngineError>;

    /// Builds base geometry for `entry` in `mode`.
    fn construct(
        &mut self,
        entry: &CatalogEntry,
        mode: VisualizationMode,
    ) -> Result<(), EngineError>;

    /// Adds hidden, non-rendered marker points to the document.
    fn attach_markers(&mut self, markers: &[AnatomyMarker]) -> Result<(), EngineError>;

    /// Applies the material for `mode`.
    fn apply_material(
        &mut self,
        entry: &CatalogEntry,
        mode: VisualizationMode,
    ) -> Result<(), EngineError>;

    /// Serializes the document to `path` under `settings`.
    fn export(&mut self, path: &Path, settings: &ExportSettings) -> Result<(), EngineError>;

    /// Handle that can terminate this engine from another thread.
    fn kill_switch(&self) -> Option<KillSwitch> {
        None
    }

    /// Returns false once the engine can no longer accept commands.
    fn is_alive(&mut self) -> bool {
        true
    }
}

/// Creates engines on demand.
pub trait EngineFactory: Send + Sync + 'static {
    /// Launches a new engine with an empty document.
    fn launch(&self) -> Result<Box<dyn AuthoringEngine>, EngineError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}
