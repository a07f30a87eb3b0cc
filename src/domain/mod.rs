//! Domain layer for the golden prompt optimizer
//!
//! This module contains the core models, errors and port traits.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ConfigError, OptimizerError, OptimizerResult, ProviderError};
