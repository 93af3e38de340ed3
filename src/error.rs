//! Error types for the clinvec pipeline.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to embedding provider operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding provider: {0}")]
    ConnectionError(String),

    #[error("embedding provider error: {0}")]
    ServerError(String),

    #[error("rate limited by embedding provider{}", .retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding request timed out")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_)
            | EmbeddingError::Timeout
            | EmbeddingError::RateLimited { .. } => true,
            // 5xx responses may be transient
            EmbeddingError::ServerError(msg) => {
                msg.contains("500")
                    || msg.contains("502")
                    || msg.contains("503")
                    || msg.contains("504")
                    || msg.to_lowercase().contains("unavailable")
            }
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            // A malformed or wrong-shaped response will not fix itself
            EmbeddingError::InvalidResponse(_) | EmbeddingError::DimensionMismatch { .. } => false,
        }
    }

    fn retry_hint(&self) -> Option<std::time::Duration> {
        match self {
            EmbeddingError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(std::time::Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Errors related to the pgvector store.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector store: {0}")]
    ConnectionError(String),

    #[error("table error: {0}")]
    TableError(String),

    #[error("insert error: {0}")]
    InsertError(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("postgres error: {0}")]
    PostgresError(String),

    #[error("pgvector extension missing: {0}")]
    PgVectorExtensionError(String),
}

/// Errors related to the checkpoint store. These are pipeline-fatal:
/// without durable checkpoints, resume guarantees no longer hold.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to open checkpoint database: {0}")]
    OpenError(String),

    #[error("checkpoint read error: {0}")]
    ReadError(String),

    #[error("checkpoint write error: {0}")]
    WriteError(String),
}

impl From<rusqlite::Error> for CheckpointError {
    fn from(e: rusqlite::Error) -> Self {
        CheckpointError::WriteError(e.to_string())
    }
}

/// Errors related to configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors raised by the top-level vectorization pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file not found: {0}")]
    InputNotFound(String),

    #[error("input parse error: {0}")]
    ParseError(String),

    #[error("error log write failed: {0}")]
    ErrorLogError(#[from] std::io::Error),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("{0}")]
    Other(String),
}
