mod config;
mod document;
mod stats;

pub use config::{
    Config, DEFAULT_CHECKPOINT_DB, DEFAULT_DATABASE_URL, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL, DEFAULT_ERROR_LOG, DEFAULT_VECTOR_TABLE,
    EmbeddingConfig, PipelineConfig, VectorStoreConfig,
};
pub use document::{ClinicalDocument, MAX_STORED_TEXT_CHARS, RawDocument};
pub use stats::ProcessingStats;
