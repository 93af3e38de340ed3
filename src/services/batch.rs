//! Batch orchestration: embedding, insertion, and checkpointing for one
//! full pass over a document set.

use crate::error::PipelineError;
use crate::models::{ClinicalDocument, ProcessingStats};
use crate::services::checkpoint::CheckpointStore;
use crate::services::embedding::Embedder;
use crate::services::vector_store::{VectorRecord, VectorStore};

/// Observational hook invoked after every batch with the running stats.
pub type BatchCallback<'a> = &'a mut dyn FnMut(&ProcessingStats);

/// Drives the embed-insert-checkpoint loop over fixed-size batches.
///
/// Batch-level provider failures and per-record insert failures are
/// recorded and counted, never raised; only checkpoint I/O errors abort
/// the run, since without durable checkpoints resume guarantees are gone.
pub struct BatchProcessor<'a> {
    embedder: &'a dyn Embedder,
    store: &'a dyn VectorStore,
    checkpoints: &'a CheckpointStore,
    embedding_model: String,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        store: &'a dyn VectorStore,
        checkpoints: &'a CheckpointStore,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            checkpoints,
            embedding_model: embedding_model.into(),
        }
    }

    /// Full pass over every input document.
    pub async fn process_documents(
        &self,
        documents: Vec<ClinicalDocument>,
        batch_size: usize,
        mut on_batch_complete: Option<BatchCallback<'_>>,
    ) -> Result<ProcessingStats, PipelineError> {
        let batch_size = batch_size.max(1);
        let mut stats = ProcessingStats::start(documents.len() as u64);

        // Record every document up front so an interrupted run leaves
        // pending rows for everything not yet attempted.
        for doc in &documents {
            self.checkpoints.mark_pending(&doc.resource_id)?;
        }

        for batch in documents.chunks(batch_size) {
            self.process_batch(batch, &mut stats).await?;

            if let Some(cb) = on_batch_complete.as_deref_mut() {
                cb(&stats);
            }
        }

        stats.finish();
        Ok(stats)
    }

    /// Resume pass: filters the input through the checkpoint store and
    /// processes only documents not yet completed.
    pub async fn resume(
        &self,
        documents: Vec<ClinicalDocument>,
        batch_size: usize,
        on_batch_complete: Option<BatchCallback<'_>>,
    ) -> Result<ProcessingStats, PipelineError> {
        let pending = self.checkpoints.pending_documents(documents)?;
        self.process_documents(pending, batch_size, on_batch_complete)
            .await
    }

    async fn process_batch(
        &self,
        batch: &[ClinicalDocument],
        stats: &mut ProcessingStats,
    ) -> Result<(), PipelineError> {
        let texts: Vec<String> = batch.iter().map(|d| d.text_content.clone()).collect();

        let vectors = match self.embedder.embed_batch(&texts).await {
            Ok(vectors) => vectors,
            Err(e) => {
                // Provider retries are already exhausted here; the failure
                // is isolated to this batch and the run continues.
                self.fail_batch(batch, stats, &e.to_string())?;
                return Ok(());
            }
        };

        let records: Vec<VectorRecord> = batch
            .iter()
            .zip(vectors)
            .map(|(doc, embedding)| VectorRecord {
                resource_id: doc.resource_id.clone(),
                patient_id: doc.patient_id.clone(),
                document_type: doc.document_type.clone(),
                text_content: doc.text_content_truncated.clone(),
                embedding,
                embedding_model: self.embedding_model.clone(),
                source_bundle: doc.source_bundle.clone(),
            })
            .collect();

        let report = match self.store.insert_vectors_batch(records).await {
            Ok(report) => report,
            Err(e) => {
                self.fail_batch(batch, stats, &e.to_string())?;
                return Ok(());
            }
        };

        for resource_id in &report.succeeded {
            self.checkpoints.mark_completed(resource_id)?;
        }
        for (resource_id, message) in &report.failed {
            self.checkpoints.mark_failed(resource_id, message)?;
        }

        stats.successful += report.success_count() as u64;
        stats.failed += report.failed_count() as u64;
        stats.processed += batch.len() as u64;

        Ok(())
    }

    fn fail_batch(
        &self,
        batch: &[ClinicalDocument],
        stats: &mut ProcessingStats,
        message: &str,
    ) -> Result<(), PipelineError> {
        for doc in batch {
            self.checkpoints.mark_failed(&doc.resource_id, message)?;
        }
        stats.failed += batch.len() as u64;
        stats.processed += batch.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbeddingError, VectorStoreError};
    use crate::models::RawDocument;
    use crate::services::vector_store::{InsertReport, SearchResult};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn docs(n: usize) -> Vec<ClinicalDocument> {
        (0..n)
            .map(|i| {
                ClinicalDocument::from_raw(RawDocument {
                    resource_id: Some(format!("doc-{i}")),
                    patient_id: Some(format!("patient-{}", i % 2)),
                    document_type: Some("DischargeSummary".to_string()),
                    text_content: Some(format!("clinical note {i}")),
                    source_bundle: None,
                })
                .unwrap()
            })
            .collect()
    }

    /// Mock provider recording batch sizes; fails every call whose
    /// 1-based ordinal appears in `fail_on_calls`.
    struct MockEmbedder {
        calls: AtomicU32,
        batch_sizes: Mutex<Vec<usize>>,
        fail_on_calls: Vec<u32>,
    }

    impl MockEmbedder {
        fn new(fail_on_calls: Vec<u32>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                batch_sizes: Mutex::new(Vec::new()),
                fail_on_calls,
            }
        }
    }

    #[async_trait]
    impl Embedder for MockEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.batch_sizes.lock().unwrap().push(texts.len());

            if self.fail_on_calls.contains(&call) {
                return Err(EmbeddingError::ServerError("status 503: busy".to_string()));
            }

            Ok(texts.iter().map(|_| vec![0.5; DIM]).collect())
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.5; DIM])
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    /// Mock store that rejects the listed resource ids and records the
    /// rest.
    struct MockStore {
        inserted: Mutex<Vec<VectorRecord>>,
        reject_ids: Vec<String>,
    }

    impl MockStore {
        fn new() -> Self {
            Self::rejecting(Vec::new())
        }

        fn rejecting(reject_ids: Vec<String>) -> Self {
            Self {
                inserted: Mutex::new(Vec::new()),
                reject_ids,
            }
        }
    }

    #[async_trait]
    impl VectorStore for MockStore {
        async fn insert_vector(&self, record: VectorRecord) -> Result<(), VectorStoreError> {
            self.inserted.lock().unwrap().push(record);
            Ok(())
        }

        async fn insert_vectors_batch(
            &self,
            records: Vec<VectorRecord>,
        ) -> Result<InsertReport, VectorStoreError> {
            let mut report = InsertReport::default();
            for record in records {
                if self.reject_ids.contains(&record.resource_id) {
                    report
                        .failed
                        .push((record.resource_id, "duplicate key".to_string()));
                } else {
                    report.succeeded.push(record.resource_id.clone());
                    self.inserted.lock().unwrap().push(record);
                }
            }
            Ok(report)
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
            Ok(self.inserted.lock().unwrap().len() as u64)
        }
    }

    fn checkpoints(dir: &TempDir) -> CheckpointStore {
        CheckpointStore::open(&dir.path().join("cp.db")).unwrap()
    }

    #[tokio::test]
    async fn test_seven_docs_batch_three_call_shape() {
        let dir = TempDir::new().unwrap();
        let embedder = MockEmbedder::new(vec![]);
        let store = MockStore::new();
        let cp = checkpoints(&dir);
        let processor = BatchProcessor::new(&embedder, &store, &cp, "test-model");

        let stats = processor.process_documents(docs(7), 3, None).await.unwrap();

        assert_eq!(*embedder.batch_sizes.lock().unwrap(), vec![3, 3, 1]);
        assert_eq!(stats.successful, 7);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.processed, 7);
    }

    #[tokio::test]
    async fn test_batch_isolation_on_provider_failure() {
        let dir = TempDir::new().unwrap();
        let embedder = MockEmbedder::new(vec![2]);
        let store = MockStore::new();
        let cp = checkpoints(&dir);
        let processor = BatchProcessor::new(&embedder, &store, &cp, "test-model");

        let stats = processor.process_documents(docs(7), 3, None).await.unwrap();

        // Batch 1 and 3 succeed, batch 2 is isolated as failed
        assert_eq!(stats.successful, 4);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.successful + stats.failed, 7);
        assert_eq!(stats.processed, 7);

        assert!(cp.is_completed("doc-0").unwrap());
        assert!(!cp.is_completed("doc-3").unwrap());
        assert!(!cp.is_completed("doc-4").unwrap());
        assert!(cp.is_completed("doc-6").unwrap());
    }

    #[tokio::test]
    async fn test_partial_insert_failure_counts() {
        let dir = TempDir::new().unwrap();
        let embedder = MockEmbedder::new(vec![]);
        let store = MockStore::rejecting(vec!["doc-1".to_string()]);
        let cp = checkpoints(&dir);
        let processor = BatchProcessor::new(&embedder, &store, &cp, "test-model");

        let stats = processor.process_documents(docs(3), 3, None).await.unwrap();

        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert!(cp.is_completed("doc-0").unwrap());
        assert!(!cp.is_completed("doc-1").unwrap());
        assert!(cp.is_completed("doc-2").unwrap());
    }

    #[tokio::test]
    async fn test_idempotent_resume() {
        let dir = TempDir::new().unwrap();
        let embedder = MockEmbedder::new(vec![]);
        let store = MockStore::new();
        let cp = checkpoints(&dir);
        let processor = BatchProcessor::new(&embedder, &store, &cp, "test-model");

        let first = processor.process_documents(docs(5), 2, None).await.unwrap();
        assert_eq!(first.successful, 5);

        let second = processor.resume(docs(5), 2, None).await.unwrap();
        assert_eq!(second.total_documents, 0);
        assert_eq!(second.processed, 0);
        assert_eq!(second.successful, 0);
    }

    #[tokio::test]
    async fn test_resume_processes_only_complement() {
        let dir = TempDir::new().unwrap();
        let embedder = MockEmbedder::new(vec![]);
        let store = MockStore::new();
        let cp = checkpoints(&dir);

        // Simulate an interrupted run that completed a prefix
        cp.mark_completed("doc-0").unwrap();
        cp.mark_completed("doc-1").unwrap();
        cp.mark_failed("doc-2", "provider error").unwrap();

        let processor = BatchProcessor::new(&embedder, &store, &cp, "test-model");
        let stats = processor.resume(docs(5), 2, None).await.unwrap();

        // doc-2 (failed) plus doc-3/doc-4 (unseen) are retried
        assert_eq!(stats.total_documents, 3);
        assert_eq!(stats.successful, 3);

        let ids: Vec<String> = store
            .inserted
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.resource_id.clone())
            .collect();
        assert_eq!(ids, vec!["doc-2", "doc-3", "doc-4"]);
    }

    #[tokio::test]
    async fn test_callback_invoked_per_batch() {
        let dir = TempDir::new().unwrap();
        let embedder = MockEmbedder::new(vec![]);
        let store = MockStore::new();
        let cp = checkpoints(&dir);
        let processor = BatchProcessor::new(&embedder, &store, &cp, "test-model");

        let mut snapshots: Vec<u64> = Vec::new();
        let mut callback = |stats: &ProcessingStats| snapshots.push(stats.processed);

        processor
            .process_documents(docs(7), 3, Some(&mut callback))
            .await
            .unwrap();

        assert_eq!(snapshots, vec![3, 6, 7]);
    }

    #[tokio::test]
    async fn test_inserts_use_truncated_text() {
        let dir = TempDir::new().unwrap();
        let embedder = MockEmbedder::new(vec![]);
        let store = MockStore::new();
        let cp = checkpoints(&dir);
        let processor = BatchProcessor::new(&embedder, &store, &cp, "test-model");

        let long_text = "y".repeat(crate::models::MAX_STORED_TEXT_CHARS + 100);
        let doc = ClinicalDocument::from_raw(RawDocument {
            resource_id: Some("doc-long".to_string()),
            patient_id: Some("p".to_string()),
            document_type: Some("Note".to_string()),
            text_content: Some(long_text),
            source_bundle: None,
        })
        .unwrap();

        processor.process_documents(vec![doc], 1, None).await.unwrap();

        let inserted = store.inserted.lock().unwrap();
        assert_eq!(
            inserted[0].text_content.chars().count(),
            crate::models::MAX_STORED_TEXT_CHARS
        );
    }

    #[tokio::test]
    async fn test_pending_rows_cover_unattempted_documents() {
        let dir = TempDir::new().unwrap();
        let embedder = MockEmbedder::new(vec![]);
        let store = MockStore::new();
        let cp = checkpoints(&dir);
        let processor = BatchProcessor::new(&embedder, &store, &cp, "test-model");

        // Mid-run, documents not yet attempted must already have pending
        // rows, so an interruption here would leave them resumable.
        let mut pending_after_first_batch = None;
        let mut callback = |stats: &ProcessingStats| {
            if stats.processed == 3 {
                pending_after_first_batch = Some(cp.status_counts().unwrap().pending);
            }
        };

        processor
            .process_documents(docs(7), 3, Some(&mut callback))
            .await
            .unwrap();

        assert_eq!(pending_after_first_batch, Some(4));

        // After a clean run nothing stays pending
        let counts = cp.status_counts().unwrap();
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.completed, 7);
    }

    #[tokio::test]
    async fn test_empty_document_set() {
        let dir = TempDir::new().unwrap();
        let embedder = MockEmbedder::new(vec![]);
        let store = MockStore::new();
        let cp = checkpoints(&dir);
        let processor = BatchProcessor::new(&embedder, &store, &cp, "test-model");

        let stats = processor.process_documents(Vec::new(), 3, None).await.unwrap();
        assert_eq!(stats.processed, 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }
}
