//! Durable per-document checkpoint store backed by SQLite.
//!
//! A document is recorded `completed` if and only if its vector has been
//! durably inserted into the vector store; resume runs skip exactly those
//! documents. Records are upserted, never deleted by the pipeline.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::CheckpointError;
use crate::models::ClinicalDocument;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    resource_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    error_message TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_status ON checkpoints(status);
"#;

/// Processing status of a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStatus {
    Pending,
    Completed,
    Failed,
}

impl CheckpointStatus {
    fn as_str(self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Completed => "completed",
            CheckpointStatus::Failed => "failed",
        }
    }
}

/// Per-status tallies, for operator-facing status output.
#[derive(Debug, Clone, Default)]
pub struct CheckpointCounts {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
}

pub struct CheckpointStore {
    conn: Connection,
}

impl CheckpointStore {
    pub fn open(path: &Path) -> Result<Self, CheckpointError> {
        let conn =
            Connection::open(path).map_err(|e| CheckpointError::OpenError(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| CheckpointError::OpenError(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| CheckpointError::OpenError(e.to_string()))?;
        Ok(Self { conn })
    }

    pub fn is_completed(&self, resource_id: &str) -> Result<bool, CheckpointError> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM checkpoints WHERE resource_id = ?1",
                params![resource_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CheckpointError::ReadError(e.to_string()))?;

        Ok(status.as_deref() == Some("completed"))
    }

    /// Record a document on first encounter. Existing rows are left
    /// untouched, so a completed or failed status is never downgraded.
    pub fn mark_pending(&self, resource_id: &str) -> Result<(), CheckpointError> {
        self.conn
            .execute(
                r#"
                INSERT INTO checkpoints (resource_id, status, error_message, updated_at)
                VALUES (?1, 'pending', NULL, datetime('now'))
                ON CONFLICT(resource_id) DO NOTHING
                "#,
                params![resource_id],
            )
            .map_err(|e| CheckpointError::WriteError(e.to_string()))?;
        Ok(())
    }

    pub fn mark_completed(&self, resource_id: &str) -> Result<(), CheckpointError> {
        self.upsert(resource_id, CheckpointStatus::Completed, None)
    }

    pub fn mark_failed(&self, resource_id: &str, error_message: &str) -> Result<(), CheckpointError> {
        self.upsert(resource_id, CheckpointStatus::Failed, Some(error_message))
    }

    fn upsert(
        &self,
        resource_id: &str,
        status: CheckpointStatus,
        error_message: Option<&str>,
    ) -> Result<(), CheckpointError> {
        self.conn
            .execute(
                r#"
                INSERT INTO checkpoints (resource_id, status, error_message, updated_at)
                VALUES (?1, ?2, ?3, datetime('now'))
                ON CONFLICT(resource_id) DO UPDATE SET
                    status = excluded.status,
                    error_message = excluded.error_message,
                    updated_at = excluded.updated_at
                "#,
                params![resource_id, status.as_str(), error_message],
            )
            .map_err(|e| CheckpointError::WriteError(e.to_string()))?;
        Ok(())
    }

    /// The resume filter: every input document whose status is not
    /// `completed`. Documents never checkpointed count as pending.
    pub fn pending_documents(
        &self,
        documents: Vec<ClinicalDocument>,
    ) -> Result<Vec<ClinicalDocument>, CheckpointError> {
        let completed = self.completed_ids()?;
        Ok(documents
            .into_iter()
            .filter(|doc| !completed.contains(&doc.resource_id))
            .collect())
    }

    fn completed_ids(&self) -> Result<HashSet<String>, CheckpointError> {
        let mut stmt = self
            .conn
            .prepare("SELECT resource_id FROM checkpoints WHERE status = 'completed'")
            .map_err(|e| CheckpointError::ReadError(e.to_string()))?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| CheckpointError::ReadError(e.to_string()))?
            .collect::<Result<HashSet<_>, _>>()
            .map_err(|e| CheckpointError::ReadError(e.to_string()))?;

        Ok(ids)
    }

    pub fn status_counts(&self) -> Result<CheckpointCounts, CheckpointError> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM checkpoints GROUP BY status")
            .map_err(|e| CheckpointError::ReadError(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| CheckpointError::ReadError(e.to_string()))?;

        let mut counts = CheckpointCounts::default();
        for row in rows {
            let (status, count) = row.map_err(|e| CheckpointError::ReadError(e.to_string()))?;
            match status.as_str() {
                "pending" => counts.pending = count as u64,
                "completed" => counts.completed = count as u64,
                "failed" => counts.failed = count as u64,
                _ => {}
            }
        }

        Ok(counts)
    }
}
