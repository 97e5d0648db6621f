//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, RenderCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Staged deployment of the GPU workflow backend
#[derive(Debug, Parser, Clone)]
#[command(name = "deploy-pipeline")]
#[command(version)]
#[command(about = "Idempotent staged deployment of a GPU workflow backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the deployment
    Run(RunCommand),

    /// Resolve configuration and modes without deploying
    Validate(ValidateCommand),

    /// Print the rendered configuration documents
    Render(RenderCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
