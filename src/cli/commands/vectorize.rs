//! Vectorize command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use super::ConnectionArgs;
use crate::models::{Config, ProcessingStats};
use crate::pipeline::VectorizationPipeline;
use crate::services::{CheckpointStore, EmbeddingClient, PgVectorStore};

/// Arguments for the vectorize command.
#[derive(Debug, Args)]
pub struct VectorizeArgs {
    /// Path to the document collection (JSON array or JSONL)
    #[arg(long, short = 'i', required = true)]
    pub input: PathBuf,

    /// Documents per embedding batch
    #[arg(long, short = 'b')]
    pub batch_size: Option<u32>,

    /// Skip documents already completed in a previous run
    #[arg(long)]
    pub resume: bool,

    /// Path to the checkpoint database
    #[arg(long)]
    pub checkpoint_db: Option<PathBuf>,

    /// Path to the validation error log
    #[arg(long)]
    pub error_log: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub async fn handle_vectorize(args: VectorizeArgs, verbose: bool) -> Result<()> {
    let mut config = Config::load()?;
    args.connection.apply(&mut config);

    let batch_size = args
        .batch_size
        .unwrap_or(config.pipeline.batch_size)
        .max(1) as usize;
    let checkpoint_db = args
        .checkpoint_db
        .unwrap_or_else(|| PathBuf::from(&config.pipeline.checkpoint_db));
    let error_log = args
        .error_log
        .unwrap_or_else(|| PathBuf::from(&config.pipeline.error_log));

    if verbose {
        println!(
            "Vectorizing {} (batch size {}, resume: {})",
            args.input.display(),
            batch_size,
            args.resume
        );
    }

    let embedding_client =
        EmbeddingClient::new(&config.embedding).context("failed to create embedding client")?;
    let store = PgVectorStore::new(&config.vector_store, config.embedding.dimension as usize)
        .await
        .context("failed to connect to vector store")?;
    store
        .create_table(false)
        .await
        .context("failed to ensure vector table")?;
    let checkpoints =
        CheckpointStore::open(&checkpoint_db).context("failed to open checkpoint store")?;

    let pipeline = VectorizationPipeline::new(
        &embedding_client,
        &store,
        &checkpoints,
        config.embedding.model.clone(),
        &error_log,
    );

    let pb = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        pb
    };

    let mut on_batch = |stats: &ProcessingStats| {
        pb.set_length(stats.total_documents);
        pb.set_position(stats.processed);
    };

    let stats = pipeline
        .vectorize(&args.input, batch_size, args.resume, Some(&mut on_batch))
        .await?;

    pb.finish_and_clear();
    print_summary(&stats);

    Ok(())
}

fn print_summary(stats: &ProcessingStats) {
    println!("Vectorization complete");
    println!("  total documents:   {}", stats.total_documents);
    println!("  validation errors: {}", stats.validation_errors);
    println!("  processed:         {}", stats.processed);
    println!("  successful:        {}", stats.successful);
    println!("  failed:            {}", stats.failed);
    println!(
        "  elapsed:           {:.1}s ({:.1} docs/s)",
        stats.elapsed_secs(),
        stats.throughput()
    );
}
