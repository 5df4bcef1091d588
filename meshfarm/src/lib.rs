//! meshfarm - tiered 3D asset variant pipeline
//!
//! Builds every catalog entry in a set of quality tiers by driving an external
//! authoring engine, enforces per-tier triangle budgets, writes the exported
//! assets atomically and describes each entry's outputs in a JSON manifest.
//!
//! # Layers
//!
//! - [`catalog`] - static table of entries × tiers × visualization modes
//! - [`engine`] - the authoring engine collaborator and its provisioning modes
//! - [`optimizer`] - single-pass triangle budget enforcement
//! - [`export`] - staged, atomically published assets and per-entry manifests
//! - [`worker`] - one job in, one result out
//! - [`scheduler`] - bounded-concurrency batches with per-entry manifest barriers
//! - [`server`] - line-delimited JSON job server
//! - [`service`] - wiring of all of the above from [`config`]
//!
//! # High-Level API
//!
//! ```ignore
//! use meshfarm::config::ConfigFile;
//! use meshfarm::service::{BuildTarget, MeshfarmService};
//!
//! let service = MeshfarmService::from_config(&ConfigFile::load()?)?;
//! let summary = service.build(&BuildTarget::All, Default::default()).await?;
//! std::process::exit(if summary.is_success() { 0 } else { 1 });
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod export;
pub mod jobs;
pub mod logging;
pub mod optimizer;
pub mod panic;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod worker;

/// Version of the meshfarm library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
