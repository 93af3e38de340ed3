//! Rate-limited, retrying client for the remote embedding provider.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::utils::retry::{RetryConfig, with_retry};

/// Batched text-to-vector conversion. Abstracted so the batch processor
/// can be exercised against a mock provider in tests.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts; the returned vectors align positionally
    /// with the input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embedding dimension guaranteed for every returned vector.
    fn dimension(&self) -> usize;
}

/// Input type hint for embedding generation (NIM-style providers
/// distinguish passage and query embeddings).
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Passage,
    Query,
}

/// Request body for the /v1/embeddings endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
    model: &'a str,
    input_type: InputType,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
    index: usize,
}

/// Client for the embedding provider.
///
/// Enforces a minimum inter-request interval of `60 / requests_per_minute`
/// seconds before every outbound call, and retries transient failures with
/// exponential backoff. The only mutable state is the last-request
/// timestamp.
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    batch_size: usize,
    min_interval: Duration,
    retry: RetryConfig,
    last_request: Mutex<Option<Instant>>,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        let min_interval = if config.requests_per_minute > 0 {
            Duration::from_secs_f64(60.0 / f64::from(config.requests_per_minute))
        } else {
            Duration::ZERO
        };

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension as usize,
            batch_size: config.batch_size.max(1) as usize,
            min_interval,
            retry: RetryConfig::new(config.max_attempts),
            last_request: Mutex::new(None),
        })
    }

    /// Embed texts with the given input type, splitting oversized input
    /// into sub-batches transparently.
    async fn embed_with_type(
        &self,
        texts: &[String],
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = with_retry(&self.retry, || self.embed_single_batch(chunk, input_type))
                .await
                .into_result()?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    /// One outbound call, rate-limited. Retries are handled by the caller.
    async fn embed_single_batch(
        &self,
        texts: &[String],
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.wait_for_rate_limit().await;

        let url = format!("{}/v1/embeddings", self.base_url);
        let request = EmbedRequest {
            input: texts,
            model: &self.model,
            input_type,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout
            } else {
                EmbeddingError::RequestError(e)
            }
        })?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(EmbeddingError::RateLimited { retry_after_secs });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        self.extract_vectors(embed_response, texts.len())
    }

    /// Restore positional order and enforce the count and dimension
    /// contracts on a decoded response.
    fn extract_vectors(
        &self,
        response: EmbedResponse,
        expected_count: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if response.data.len() != expected_count {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                expected_count,
                response.data.len()
            )));
        }

        let mut rows = response.data;
        rows.sort_by_key(|row| row.index);

        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            if row.embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: row.embedding.len(),
                });
            }
            vectors.push(row.embedding);
        }

        Ok(vectors)
    }

    /// Sleep out the remainder of the minimum inter-request interval, then
    /// record this call as the most recent one.
    async fn wait_for_rate_limit(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let since = previous.elapsed();
            if since < self.min_interval {
                tokio::time::sleep(self.min_interval - since).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_with_type(texts, InputType::Passage).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let texts = vec![text.to_string()];
        let embeddings = self.embed_with_type(&texts, InputType::Query).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
