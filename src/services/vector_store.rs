//! pgvector-backed vector store client.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;

use crate::error::VectorStoreError;
use crate::models::VectorStoreConfig;

/// One row destined for the vector table.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub resource_id: String,
    pub patient_id: String,
    pub document_type: String,
    /// Truncated storage copy of the note text.
    pub text_content: String,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub source_bundle: Option<String>,
}

/// Per-record outcome of a batch insert. Records are attempted
/// independently; one failure never aborts its siblings.
#[derive(Debug, Default)]
pub struct InsertReport {
    pub succeeded: Vec<String>,
    /// (resource_id, error message) pairs.
    pub failed: Vec<(String, String)>,
}

impl InsertReport {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// A similarity search hit, ordered by descending similarity.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub resource_id: String,
    pub patient_id: String,
    pub document_type: String,
    pub text_content: String,
    pub similarity: f32,
}

/// Aggregate statistics over the vector table.
#[derive(Debug, Clone, Default)]
pub struct VectorStats {
    pub total_vectors: u64,
    pub distinct_patients: u64,
    /// (document_type, count) pairs, largest first.
    pub by_document_type: Vec<(String, u64)>,
}

/// Store operations the pipeline depends on. Abstracted so the batch
/// processor can run against a mock store in tests.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert a single record; transactional per call.
    async fn insert_vector(&self, record: VectorRecord) -> Result<(), VectorStoreError>;

    /// Insert records independently, reporting per-record outcomes
    /// instead of failing the whole batch.
    async fn insert_vectors_batch(
        &self,
        records: Vec<VectorRecord>,
    ) -> Result<InsertReport, VectorStoreError>;

    /// Top-k cosine similarity search with optional filters.
    async fn search_similar(
        &self,
        query_vector: &[f32],
        top_k: u64,
        patient_id: Option<&str>,
        document_type: Option<&str>,
    ) -> Result<Vec<SearchResult>, VectorStoreError>;

    /// Total number of stored vectors.
    async fn count_vectors(&self) -> Result<u64, VectorStoreError>;
}

/// Enforce the fixed-width vector contract before any SQL runs.
fn check_dimension(expected: usize, actual: usize) -> Result<(), VectorStoreError> {
    if actual != expected {
        return Err(VectorStoreError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Build the top-k similarity query. Results come back ordered by cosine
/// distance ascending, i.e. similarity descending, capped at `top_k`.
fn build_search_query(
    table_name: &str,
    top_k: u64,
    filter_patient: bool,
    filter_document_type: bool,
) -> String {
    let mut where_parts = Vec::new();
    let mut param_index = 2;

    if filter_patient {
        where_parts.push(format!("patient_id = ${}", param_index));
        param_index += 1;
    }
    if filter_document_type {
        where_parts.push(format!("document_type = ${}", param_index));
    }

    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_parts.join(" AND "))
    };

    format!(
        r#"
        SELECT
            resource_id,
            patient_id,
            document_type,
            text_content,
            1 - (embedding <=> $1) as similarity
        FROM {}
        {}
        ORDER BY embedding <=> $1
        LIMIT {}
        "#,
        table_name, where_clause, top_k
    )
}

pub struct PgVectorStore {
    pool: PgPool,
    table_name: String,
    dimension: usize,
}

impl PgVectorStore {
    pub async fn new(
        config: &VectorStoreConfig,
        dimension: usize,
    ) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout.into()))
            .connect(&config.url)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        let store = Self {
            pool,
            table_name: config.qualified_table_name(),
            dimension,
        };

        store.check_pgvector_extension().await?;

        if let Some(ref schema) = config.schema {
            store.ensure_schema(schema).await?;
        }

        Ok(store)
    }

    async fn check_pgvector_extension(&self) -> Result<(), VectorStoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        if result.is_none() {
            return Err(VectorStoreError::PgVectorExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    async fn ensure_schema(&self, schema: &str) -> Result<(), VectorStoreError> {
        let query = format!("CREATE SCHEMA IF NOT EXISTS {}", schema);
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;
        Ok(())
    }

    /// Liveness probe against the connection pool.
    pub async fn health_check(&self) -> Result<bool, VectorStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    /// Idempotent table creation; drops the existing table first when
    /// requested.
    pub async fn create_table(&self, drop_if_exists: bool) -> Result<(), VectorStoreError> {
        if drop_if_exists {
            let drop = format!("DROP TABLE IF EXISTS {}", self.table_name);
            sqlx::query(&drop)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::TableError(e.to_string()))?;
        }

        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                resource_id TEXT PRIMARY KEY,
                patient_id TEXT NOT NULL,
                document_type TEXT NOT NULL,
                text_content TEXT NOT NULL,
                embedding vector({}) NOT NULL,
                embedding_model TEXT NOT NULL,
                source_bundle TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            self.table_name, self.dimension
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::TableError(e.to_string()))?;

        let index_prefix = self.table_name.replace('.', "_");
        let indices = [
            format!(
                "CREATE INDEX IF NOT EXISTS {}_embedding_idx ON {} USING hnsw (embedding vector_cosine_ops)",
                index_prefix, self.table_name
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {}_patient_idx ON {} (patient_id)",
                index_prefix, self.table_name
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {}_doc_type_idx ON {} (document_type)",
                index_prefix, self.table_name
            ),
        ];

        for index_sql in &indices {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::TableError(e.to_string()))?;
        }

        Ok(())
    }

    /// Full aggregate breakdown: total, distinct patients, per-type counts.
    pub async fn get_vector_stats(&self) -> Result<VectorStats, VectorStoreError> {
        let totals: (i64, i64) = sqlx::query_as(&format!(
            "SELECT COUNT(*), COUNT(DISTINCT patient_id) FROM {}",
            self.table_name
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        let rows = sqlx::query(&format!(
            "SELECT document_type, COUNT(*) as count FROM {} GROUP BY document_type ORDER BY count DESC, document_type ASC",
            self.table_name
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        let by_document_type = rows
            .into_iter()
            .map(|row: PgRow| {
                let document_type: String = row.get("document_type");
                let count: i64 = row.get("count");
                (document_type, count as u64)
            })
            .collect();

        Ok(VectorStats {
            total_vectors: totals.0 as u64,
            distinct_patients: totals.1 as u64,
            by_document_type,
        })
    }

    fn insert_query(&self) -> String {
        format!(
            r#"
            INSERT INTO {} (resource_id, patient_id, document_type, text_content,
                            embedding, embedding_model, source_bundle)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (resource_id) DO UPDATE SET
                patient_id = EXCLUDED.patient_id,
                document_type = EXCLUDED.document_type,
                text_content = EXCLUDED.text_content,
                embedding = EXCLUDED.embedding,
                embedding_model = EXCLUDED.embedding_model,
                source_bundle = EXCLUDED.source_bundle,
                updated_at = now()
            "#,
            self.table_name
        )
    }

    async fn insert_one(&self, query: &str, record: &VectorRecord) -> Result<(), VectorStoreError> {
        check_dimension(self.dimension, record.embedding.len())?;

        let embedding = Vector::from(record.embedding.clone());

        sqlx::query(query)
            .bind(&record.resource_id)
            .bind(&record.patient_id)
            .bind(&record.document_type)
            .bind(&record.text_content)
            .bind(&embedding)
            .bind(&record.embedding_model)
            .bind(&record.source_bundle)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::InsertError(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn insert_vector(&self, record: VectorRecord) -> Result<(), VectorStoreError> {
        let query = self.insert_query();
        self.insert_one(&query, &record).await
    }

    async fn insert_vectors_batch(
        &self,
        records: Vec<VectorRecord>,
    ) -> Result<InsertReport, VectorStoreError> {
        let query = self.insert_query();
        let mut report = InsertReport::default();

        // Throughput over atomicity: each record stands alone so one bad
        // row cannot discard the rest of the batch.
        for record in records {
            match self.insert_one(&query, &record).await {
                Ok(()) => report.succeeded.push(record.resource_id),
                Err(e) => report.failed.push((record.resource_id, e.to_string())),
            }
        }

        Ok(report)
    }

    async fn search_similar(
        &self,
        query_vector: &[f32],
        top_k: u64,
        patient_id: Option<&str>,
        document_type: Option<&str>,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        check_dimension(self.dimension, query_vector.len())?;

        let embedding = Vector::from(query_vector.to_vec());
        let query = build_search_query(
            &self.table_name,
            top_k,
            patient_id.is_some(),
            document_type.is_some(),
        );

        let mut query_builder = sqlx::query(&query).bind(&embedding);
        if let Some(pid) = patient_id {
            query_builder = query_builder.bind(pid);
        }
        if let Some(dtype) = document_type {
            query_builder = query_builder.bind(dtype);
        }

        let rows = query_builder
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        let results = rows
            .into_iter()
            .map(|row: PgRow| {
                let similarity: f64 = row.get("similarity");
                SearchResult {
                    resource_id: row.get("resource_id"),
                    patient_id: row.get("patient_id"),
                    document_type: row.get("document_type"),
                    text_content: row.get("text_content"),
                    similarity: similarity as f32,
                }
            })
            .collect();

        Ok(results)
    }

    async fn count_vectors(&self) -> Result<u64, VectorStoreError> {
        let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", self.table_name))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        Ok(row.0 as u64)
    }
}
