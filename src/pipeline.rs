//! Top-level vectorization pipeline: loading, validation, preprocessing,
//! and delegation to the batch processor.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::PipelineError;
use crate::models::{ClinicalDocument, ProcessingStats, RawDocument};
use crate::services::{
    BatchCallback, BatchProcessor, CheckpointStore, Embedder, SearchResult, VectorStore,
};

pub struct VectorizationPipeline<'a> {
    embedder: &'a dyn Embedder,
    store: &'a dyn VectorStore,
    checkpoints: &'a CheckpointStore,
    embedding_model: String,
    error_log: PathBuf,
}

impl<'a> VectorizationPipeline<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        store: &'a dyn VectorStore,
        checkpoints: &'a CheckpointStore,
        embedding_model: impl Into<String>,
        error_log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            embedder,
            store,
            checkpoints,
            embedding_model: embedding_model.into(),
            error_log: error_log.into(),
        }
    }

    /// Load raw document records from a JSON array or JSONL file.
    pub fn load_documents(path: &Path) -> Result<Vec<RawDocument>, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::InputNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::ParseError(format!("{}: {}", path.display(), e)))?;
        let content = content.trim();

        if content.is_empty() {
            return Ok(Vec::new());
        }

        if content.starts_with('[') {
            return serde_json::from_str(content)
                .map_err(|e| PipelineError::ParseError(format!("invalid JSON array: {e}")));
        }

        // Fall back to JSONL, one record per line
        let mut documents = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let doc: RawDocument = serde_json::from_str(line).map_err(|e| {
                PipelineError::ParseError(format!("invalid JSON at line {}: {}", i + 1, e))
            })?;
            documents.push(doc);
        }

        Ok(documents)
    }

    /// One full run: load, validate (logging failures and continuing),
    /// preprocess, then hand off to the batch processor.
    pub async fn vectorize(
        &self,
        input: &Path,
        batch_size: usize,
        resume: bool,
        on_batch_complete: Option<BatchCallback<'_>>,
    ) -> Result<ProcessingStats, PipelineError> {
        let raw_documents = Self::load_documents(input)?;
        let total = raw_documents.len() as u64;

        let mut documents = Vec::with_capacity(raw_documents.len());
        let mut validation_errors = 0u64;

        for raw in raw_documents {
            if let Some(reason) = raw.validate() {
                self.log_validation_error(raw.resource_id.as_deref(), &reason)?;
                validation_errors += 1;
                continue;
            }
            // Validation passed, so preprocessing cannot fail here
            if let Ok(doc) = ClinicalDocument::from_raw(raw) {
                documents.push(doc);
            }
        }

        let processor = BatchProcessor::new(
            self.embedder,
            self.store,
            self.checkpoints,
            self.embedding_model.clone(),
        );

        let mut stats = if resume {
            processor
                .resume(documents, batch_size, on_batch_complete)
                .await?
        } else {
            processor
                .process_documents(documents, batch_size, on_batch_complete)
                .await?
        };

        stats.total_documents = total;
        stats.validation_errors = validation_errors;
        Ok(stats)
    }

    /// Smoke-test entry point: embed a query and search the vector table.
    pub async fn test_search(
        &self,
        query: &str,
        top_k: u64,
    ) -> Result<Vec<SearchResult>, PipelineError> {
        let vector = self.embedder.embed_query(query).await?;
        let results = self
            .store
            .search_similar(&vector, top_k, None, None)
            .await?;
        Ok(results)
    }

    /// Append one line per validation failure to the error log. The log is
    /// for post-hoc audit only and is never read back.
    fn log_validation_error(
        &self,
        resource_id: Option<&str>,
        reason: &str,
    ) -> Result<(), PipelineError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.error_log)?;

        writeln!(
            file,
            "{}\t{}\t{}",
            Utc::now().to_rfc3339(),
            resource_id.unwrap_or("<missing>"),
            reason
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbeddingError, VectorStoreError};
    use crate::services::{InsertReport, VectorRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const DIM: usize = 4;

    struct RecordingEmbedder {
        embedded_texts: Mutex<Vec<String>>,
    }

    impl RecordingEmbedder {
        fn new() -> Self {
            Self {
                embedded_texts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Embedder for RecordingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.embedded_texts
                .lock()
                .unwrap()
                .extend(texts.iter().cloned());
            Ok(texts.iter().map(|_| vec![0.1; DIM]).collect())
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.1; DIM])
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    struct AcceptingStore;

    #[async_trait]
    impl VectorStore for AcceptingStore {
        async fn insert_vector(&self, _record: VectorRecord) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn insert_vectors_batch(
            &self,
            records: Vec<VectorRecord>,
        ) -> Result<InsertReport, VectorStoreError> {
            Ok(InsertReport {
                succeeded: records.into_iter().map(|r| r.resource_id).collect(),
                failed: Vec::new(),
            })
        }

        async fn search_similar(
            &self,
            _query_vector: &[f32],
            _top_k: u64,
            _patient_id: Option<&str>,
            _document_type: Option<&str>,
        ) -> Result<Vec<SearchResult>, VectorStoreError> {
            Ok(Vec::new())
        }

        async fn count_vectors(&self) -> Result<u64, VectorStoreError> {
            Ok(0)
        }
    }

    fn write_input(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_documents_json_array() {
        let dir = TempDir::new().unwrap();
        let path = write_input(
            &dir,
            "docs.json",
            r#"[{"resource_id":"a","patient_id":"p","document_type":"t","text_content":"x"}]"#,
        );
        let docs = VectorizationPipeline::load_documents(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].resource_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_load_documents_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = write_input(
            &dir,
            "docs.jsonl",
            "{\"resource_id\":\"a\"}\n\n{\"resource_id\":\"b\"}\n",
        );
        let docs = VectorizationPipeline::load_documents(&path).unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_load_documents_not_found() {
        let result = VectorizationPipeline::load_documents(Path::new("/nonexistent/docs.json"));
        assert!(matches!(result, Err(PipelineError::InputNotFound(_))));
    }

    #[test]
    fn test_load_documents_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write_input(&dir, "bad.json", "[{not json");
        let result = VectorizationPipeline::load_documents(&path);
        assert!(matches!(result, Err(PipelineError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_validation_exclusion() {
        let dir = TempDir::new().unwrap();
        let input = write_input(
            &dir,
            "docs.json",
            r#"[
                {"resource_id":"ok-1","patient_id":"p","document_type":"t","text_content":"valid note"},
                {"resource_id":"bad-1","patient_id":"p","document_type":"t","text_content":"   "},
                {"patient_id":"p","document_type":"t","text_content":"no id"},
                {"resource_id":"ok-2","patient_id":"p","document_type":"t","text_content":"another note"}
            ]"#,
        );

        let embedder = RecordingEmbedder::new();
        let store = AcceptingStore;
        let cp = CheckpointStore::open(&dir.path().join("cp.db")).unwrap();
        let error_log = dir.path().join("errors.log");
        let pipeline =
            VectorizationPipeline::new(&embedder, &store, &cp, "test-model", &error_log);

        let stats = pipeline.vectorize(&input, 10, false, None).await.unwrap();

        assert_eq!(stats.total_documents, 4);
        assert_eq!(stats.validation_errors, 2);
        assert_eq!(stats.successful, 2);

        // Invalid documents never reach the embedding provider
        let texts = embedder.embedded_texts.lock().unwrap();
        assert_eq!(texts.len(), 2);
        assert!(texts.iter().all(|t| t.contains("note")));

        // Both failures were appended to the error log
        let log = std::fs::read_to_string(&error_log).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.contains("bad-1"));
        assert!(log.contains("<missing>"));
    }

    #[tokio::test]
    async fn test_vectorize_resume_skips_completed() {
        let dir = TempDir::new().unwrap();
        let input = write_input(
            &dir,
            "docs.json",
            r#"[
                {"resource_id":"a","patient_id":"p","document_type":"t","text_content":"note a"},
                {"resource_id":"b","patient_id":"p","document_type":"t","text_content":"note b"}
            ]"#,
        );

        let embedder = RecordingEmbedder::new();
        let store = AcceptingStore;
        let cp = CheckpointStore::open(&dir.path().join("cp.db")).unwrap();
        cp.mark_completed("a").unwrap();

        let error_log = dir.path().join("errors.log");
        let pipeline =
            VectorizationPipeline::new(&embedder, &store, &cp, "test-model", &error_log);

        let stats = pipeline.vectorize(&input, 10, true, None).await.unwrap();
        assert_eq!(stats.successful, 1);
        assert_eq!(embedder.embedded_texts.lock().unwrap().as_slice(), ["note b"]);
    }
}
