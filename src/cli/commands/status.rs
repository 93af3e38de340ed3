//! Status command implementation.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::ConnectionArgs;
use crate::models::Config;
use crate::services::{CheckpointStore, PgVectorStore};

/// Arguments for the status command.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Path to the checkpoint database
    #[arg(long)]
    pub checkpoint_db: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub async fn handle_status(args: StatusArgs, verbose: bool) -> Result<()> {
    let mut config = Config::load()?;
    args.connection.apply(&mut config);

    let checkpoint_db = args
        .checkpoint_db
        .unwrap_or_else(|| PathBuf::from(&config.pipeline.checkpoint_db));

    if checkpoint_db.exists() {
        let checkpoints =
            CheckpointStore::open(&checkpoint_db).context("failed to open checkpoint store")?;
        let counts = checkpoints.status_counts()?;
        println!("Checkpoints ({})", checkpoint_db.display());
        println!("  completed: {}", counts.completed);
        println!("  failed:    {}", counts.failed);
        println!("  pending:   {}", counts.pending);
    } else {
        println!("Checkpoints: no database at {}", checkpoint_db.display());
    }

    let store = PgVectorStore::new(&config.vector_store, config.embedding.dimension as usize)
        .await
        .context("failed to connect to vector store")?;

    let healthy = store.health_check().await.unwrap_or(false);
    let stats = store.get_vector_stats().await?;
    println!("Vector store ({})", config.vector_store.qualified_table_name());
    println!("  reachable: {}", if healthy { "yes" } else { "no" });
    println!("  vectors:   {}", stats.total_vectors);
    println!("  patients:  {}", stats.distinct_patients);

    if verbose {
        for (doc_type, count) in &stats.by_document_type {
            println!("    {}: {}", doc_type, count);
        }
    }

    Ok(())
}
