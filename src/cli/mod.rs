//! CLI module for the clinvec pipeline.

pub mod commands;

use clap::{Parser, Subcommand};

/// Resumable batch vectorization pipeline for clinical documents.
#[derive(Debug, Parser)]
#[command(name = "clinvec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Vectorize a document collection into the vector store
    Vectorize(commands::VectorizeArgs),

    /// Run a similarity search against the vector table
    Search(commands::SearchArgs),

    /// Show checkpoint and vector store statistics
    Status(commands::StatusArgs),

    /// Create (or recreate) the vector table
    Init(commands::InitArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
