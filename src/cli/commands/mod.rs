//! Command handlers.

mod config;
mod init;
mod search;
mod status;
mod vectorize;

pub use config::{ConfigCommand, handle_config};
pub use init::{InitArgs, handle_init};
pub use search::{SearchArgs, handle_search};
pub use status::{StatusArgs, handle_status};
pub use vectorize::{VectorizeArgs, handle_vectorize};

use clap::Args;

use crate::models::Config;

/// Connection parameters shared by all commands, sourced from flags or
/// environment variables.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// PostgreSQL connection URL for the vector store
    #[arg(long, env = "CLINVEC_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Base URL of the embedding provider
    #[arg(long, env = "CLINVEC_EMBEDDING_URL")]
    pub embedding_url: Option<String>,

    /// API key for the embedding provider
    #[arg(long, env = "CLINVEC_EMBEDDING_API_KEY", hide_env_values = true)]
    pub embedding_api_key: Option<String>,
}

impl ConnectionArgs {
    /// Overlay CLI/env connection parameters onto the loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref url) = self.database_url {
            config.vector_store.url = url.clone();
        }
        if let Some(ref url) = self.embedding_url {
            config.embedding.url = url.clone();
        }
        if let Some(ref key) = self.embedding_api_key {
            config.embedding.api_key = Some(key.clone());
        }
    }
}
