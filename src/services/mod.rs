mod batch;
mod checkpoint;
mod embedding;
mod vector_store;

pub use batch::{BatchCallback, BatchProcessor};
pub use checkpoint::{CheckpointCounts, CheckpointStatus, CheckpointStore};
pub use embedding::{Embedder, EmbeddingClient, InputType};
pub use vector_store::{
    InsertReport, PgVectorStore, SearchResult, VectorRecord, VectorStats, VectorStore,
};
