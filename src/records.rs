//! File, artifact and task-run bookkeeping.
//!
//! The relational schema lives outside this crate; [`RecordStore`] is the
//! slice of it the worker needs. [`MemoryRecordStore`] backs tests and the
//! CLI.

use crate::error::DocPipeError;
use crate::pipeline::assemble::file_stem;
use crate::task::run::TaskRun;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Availability of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Ready,
    Locked,
    Deleted,
}

/// An uploaded source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    pub user_filename: String,
    /// `s3://bucket/key` of the stored bytes, when known.
    pub storage_uri: Option<String>,
    pub status: FileStatus,
    pub mime_type: Option<String>,
    pub byte_size: Option<u64>,
    pub sha256: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    /// A Ready record with a random id and no storage location yet.
    pub fn new(owner_id: impl Into<String>, user_filename: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            user_filename: user_filename.into(),
            storage_uri: None,
            status: FileStatus::Ready,
            mime_type: None,
            byte_size: None,
            sha256: None,
            created_at: Utc::now(),
        }
    }

    /// Whether tasks may run against this file.
    pub fn is_live(&self) -> bool {
        self.status != FileStatus::Deleted
    }

    /// The user file name without its extension.
    pub fn stem(&self) -> &str {
        file_stem(&self.user_filename)
    }
}

/// A stored output of a task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub file_id: String,
    pub task_run_id: String,
    pub kind: String,
    pub storage_uri: String,
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        file_id: impl Into<String>,
        task_run_id: impl Into<String>,
        kind: impl Into<String>,
        storage_uri: impl Into<String>,
        meta: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_id: file_id.into(),
            task_run_id: task_run_id.into(),
            kind: kind.into(),
            storage_uri: storage_uri.into(),
            meta,
            created_at: Utc::now(),
        }
    }
}

/// Persistence for runs, files and artifacts.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_run(&self, id: &str) -> Result<Option<TaskRun>, DocPipeError>;

    async fn insert_run(&self, run: TaskRun) -> Result<(), DocPipeError>;

    /// Overwrite an existing run. Unknown ids are [`DocPipeError::TaskRunNotFound`].
    async fn update_run(&self, run: &TaskRun) -> Result<(), DocPipeError>;

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DocPipeError>;

    async fn insert_file(&self, file: FileRecord) -> Result<(), DocPipeError>;

    async fn insert_artifact(&self, artifact: Artifact) -> Result<(), DocPipeError>;

    /// Artifacts of one run, in insertion order.
    async fn list_artifacts(&self, task_run_id: &str) -> Result<Vec<Artifact>, DocPipeError>;
}

// ── In-memory store ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    runs: RwLock<HashMap<String, TaskRun>>,
    files: RwLock<HashMap<String, FileRecord>>,
    artifacts: RwLock<Vec<Artifact>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a file's status, e.g. to simulate deletion.
    pub async fn set_file_status(&self, id: &str, status: FileStatus) -> Result<(), DocPipeError> {
        let mut files = self.files.write().await;
        let file = files.get_mut(id).ok_or_else(|| DocPipeError::FileNotFound { path: id.into() })?;
        file.status = status;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_run(&self, id: &str) -> Result<Option<TaskRun>, DocPipeError> {
        Ok(self.runs.read().await.get(id).cloned())
    }

    async fn insert_run(&self, run: TaskRun) -> Result<(), DocPipeError> {
        self.runs.write().await.insert(run.id.clone(), run);
        Ok(())
    }

    async fn update_run(&self, run: &TaskRun) -> Result<(), DocPipeError> {
        let mut runs = self.runs.write().await;
        let slot = runs
            .get_mut(&run.id)
            .ok_or_else(|| DocPipeError::TaskRunNotFound(run.id.clone()))?;
        *slot = run.clone();
        Ok(())
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DocPipeError> {
        Ok(self.files.read().await.get(id).cloned())
    }

    async fn insert_file(&self, file: FileRecord) -> Result<(), DocPipeError> {
        self.files.write().await.insert(file.id.clone(), file);
        Ok(())
    }

    async fn insert_artifact(&self, artifact: Artifact) -> Result<(), DocPipeError> {
        self.artifacts.write().await.push(artifact);
        Ok(())
    }

    async fn list_artifacts(&self, task_run_id: &str) -> Result<Vec<Artifact>, DocPipeError> {
        Ok(self
            .artifacts
            .read()
            .await
            .iter()
            .filter(|a| a.task_run_id == task_run_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn stem_drops_last_extension_only() {
        assert_eq!(FileRecord::new("o", "report.final.docx").stem(), "report.final");
        assert_eq!(FileRecord::new("o", "README").stem(), "README");
    }

    #[test]
    fn deleted_files_are_not_live() {
        let mut f = FileRecord::new("o", "a.pdf");
        assert!(f.is_live());
        f.status = FileStatus::Locked;
        assert!(f.is_live());
        f.status = FileStatus::Deleted;
        assert!(!f.is_live());
    }

    #[tokio::test]
    async fn update_requires_existing_run() {
        let store = MemoryRecordStore::new();
        let run = TaskRun::new("f", "to_pdf", Map::new());
        assert!(matches!(
            store.update_run(&run).await,
            Err(DocPipeError::TaskRunNotFound(_))
        ));
        store.insert_run(run.clone()).await.unwrap();
        store.update_run(&run).await.unwrap();
        assert_eq!(store.get_run(&run.id).await.unwrap(), Some(run));
    }

    #[tokio::test]
    async fn artifacts_listed_per_run_in_order() {
        let store = MemoryRecordStore::new();
        for (run, kind) in [("r1", "a"), ("r2", "b"), ("r1", "c")] {
            store
                .insert_artifact(Artifact::new("f", run, kind, "s3://b/k", json!({})))
                .await
                .unwrap();
        }
        let kinds: Vec<String> = store
            .list_artifacts("r1")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(kinds, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn set_file_status_marks_deleted() {
        let store = MemoryRecordStore::new();
        let f = FileRecord::new("o", "a.pdf");
        store.insert_file(f.clone()).await.unwrap();
        store.set_file_status(&f.id, FileStatus::Deleted).await.unwrap();
        assert!(!store.get_file(&f.id).await.unwrap().unwrap().is_live());
    }
}
