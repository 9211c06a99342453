//! CLI, configuration and terminal display surface
//!
//! This crate provides the `koci-planner` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod surface;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
