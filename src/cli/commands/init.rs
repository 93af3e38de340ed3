//! Init command implementation.

use anyhow::{Context, Result};
use clap::Args;

use super::ConnectionArgs;
use crate::models::Config;
use crate::services::PgVectorStore;

/// Arguments for the init command.
#[derive(Debug, Args)]
pub struct InitArgs {
    /// Drop the existing table before creating it
    #[arg(long)]
    pub drop: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub async fn handle_init(args: InitArgs, verbose: bool) -> Result<()> {
    let mut config = Config::load()?;
    args.connection.apply(&mut config);

    if args.drop {
        println!(
            "This will drop the existing table '{}' and all stored vectors. Continue? [y/N]",
            config.vector_store.qualified_table_name()
        );
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let store = PgVectorStore::new(&config.vector_store, config.embedding.dimension as usize)
        .await
        .context("failed to connect to vector store")?;

    store.create_table(args.drop).await?;

    if verbose {
        println!(
            "Table '{}' ready (dimension {})",
            config.vector_store.qualified_table_name(),
            config.embedding.dimension
        );
    } else {
        println!("Vector table ready.");
    }

    Ok(())
}
