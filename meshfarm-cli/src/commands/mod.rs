//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`build`] - Batch build of one entry or the whole catalog
//! - [`catalog`] - List entries, tiers and modes
//! - [`config`] - Configuration management (path, init, show)
//! - [`serve`] - Run the job server until Ctrl+C

pub mod build;
pub mod catalog;
pub mod config;
pub mod serve;
