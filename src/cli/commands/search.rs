//! Search command implementation.

use anyhow::{Context, Result};
use clap::Args;

use super::ConnectionArgs;
use crate::models::Config;
use crate::services::{Embedder, EmbeddingClient, PgVectorStore, VectorStore};

/// Arguments for the search command.
#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Query text
    #[arg(required = true)]
    pub query: String,

    /// Maximum number of results
    #[arg(long, short = 'k', default_value = "5")]
    pub top_k: u64,

    /// Restrict results to one patient
    #[arg(long)]
    pub patient_id: Option<String>,

    /// Restrict results to one document type
    #[arg(long)]
    pub doc_type: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub async fn handle_search(args: SearchArgs, verbose: bool) -> Result<()> {
    let mut config = Config::load()?;
    args.connection.apply(&mut config);

    let embedding_client =
        EmbeddingClient::new(&config.embedding).context("failed to create embedding client")?;
    let store = PgVectorStore::new(&config.vector_store, config.embedding.dimension as usize)
        .await
        .context("failed to connect to vector store")?;

    if verbose {
        println!("Searching for: {}", args.query);
    }

    let query_vector = embedding_client.embed_query(&args.query).await?;
    let results = store
        .search_similar(
            &query_vector,
            args.top_k,
            args.patient_id.as_deref(),
            args.doc_type.as_deref(),
        )
        .await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let preview: String = result.text_content.chars().take(200).collect();
        println!(
            "{}. [{:.4}] {} (patient {}, {})",
            i + 1,
            result.similarity,
            result.resource_id,
            result.patient_id,
            result.document_type
        );
        println!("   {}", preview);
    }

    Ok(())
}
