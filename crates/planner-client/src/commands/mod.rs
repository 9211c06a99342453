//! Command implementations.

pub mod config;
pub mod drive;
pub mod tasks;
