use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running counters for one vectorization run. Owned by the pipeline for
/// the duration of a single `vectorize()` invocation and reset each time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_documents: u64,
    pub validation_errors: u64,
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProcessingStats {
    pub fn start(total_documents: u64) -> Self {
        Self {
            total_documents,
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn elapsed_secs(&self) -> f64 {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as f64 / 1000.0,
            (Some(start), None) => (Utc::now() - start).num_milliseconds().max(0) as f64 / 1000.0,
            _ => 0.0,
        }
    }

    /// Documents processed per second, 0 when nothing has run yet.
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed_secs();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.processed as f64 / elapsed
    }
}
