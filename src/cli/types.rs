//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::optimize::OptimizeArgs;
use super::commands::predict::PredictArgs;

/// Command-line interface of the `golden-prompt` binary.
#[derive(Parser, Debug)]
#[command(name = "golden-prompt")]
#[command(about = "Golden Prompt - iterative prompt optimizer", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file, replacing .golden-prompt/config.yaml and local.yaml
    #[arg(short, long, global = true, env = "GOLDEN_PROMPT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search for a prompt that reproduces the labeled dataset
    Optimize(OptimizeArgs),

    /// Apply a golden prompt to unlabeled inputs
    Predict(PredictArgs),

    /// Show the effective configuration
    Config,
}
