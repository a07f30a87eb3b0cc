//! CLI command implementations.

pub mod config;
pub mod optimize;
pub mod predict;
