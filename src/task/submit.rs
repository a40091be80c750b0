//! Upload and submission: the producer side of the task queue.

use crate::detect::OCTET_STREAM;
use crate::error::DocPipeError;
use crate::records::{FileRecord, RecordStore};
use crate::storage::{self, ObjectStore};
use crate::task::run::TaskRun;
use crate::task::TaskTrigger;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct Submitter {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    queue: mpsc::Sender<TaskTrigger>,
}

impl Submitter {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        queue: mpsc::Sender<TaskTrigger>,
    ) -> Self {
        Self {
            objects,
            records,
            queue,
        }
    }

    /// Store `bytes` under the canonical source key and record a Ready file.
    ///
    /// The content type falls back to a guess from `filename`.
    pub async fn upload(
        &self,
        owner_id: &str,
        filename: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<FileRecord, DocPipeError> {
        if bytes.is_empty() {
            return Err(DocPipeError::EmptyInput);
        }
        let mut file = FileRecord::new(owner_id, filename);
        let mime = content_type
            .map(str::to_string)
            .or_else(|| mime_guess::from_path(filename).first_raw().map(str::to_string))
            .unwrap_or_else(|| OCTET_STREAM.to_string());

        file.sha256 = Some(hex::encode(Sha256::digest(&bytes)));
        file.byte_size = Some(bytes.len() as u64);
        let key = storage::source_key(owner_id, &file.id, filename);
        file.storage_uri = Some(self.objects.put(&key, bytes, &mime).await?);
        file.mime_type = Some(mime);

        info!(
            "Uploaded {} for {} as file {} ({} bytes)",
            filename,
            owner_id,
            file.id,
            file.byte_size.unwrap_or_default()
        );
        self.records.insert_file(file.clone()).await?;
        Ok(file)
    }

    /// Create one Pending run of `task_name` per live file and enqueue it.
    ///
    /// Unknown and deleted files are skipped.
    ///
    /// # Errors
    /// [`DocPipeError::InvalidParams`] when no file id is valid.
    pub async fn submit(
        &self,
        file_ids: &[String],
        task_name: &str,
        params: Map<String, Value>,
    ) -> Result<Vec<TaskRun>, DocPipeError> {
        let mut runs = Vec::new();
        for file_id in file_ids {
            match self.records.get_file(file_id).await? {
                Some(file) if file.is_live() => {}
                _ => {
                    debug!("Skipping missing or deleted file {}", file_id);
                    continue;
                }
            }

            let run = TaskRun::new(file_id, task_name, params.clone());
            self.records.insert_run(run.clone()).await?;
            self.queue
                .send(TaskTrigger {
                    task_name: task_name.to_string(),
                    task_run_id: run.id.clone(),
                })
                .await
                .map_err(|_| DocPipeError::Internal("task queue is closed".to_string()))?;
            runs.push(run);
        }

        if runs.is_empty() {
            return Err(DocPipeError::InvalidParams("no valid files to run".to_string()));
        }
        info!("Submitted {} run(s) of '{}'", runs.len(), task_name);
        Ok(runs)
    }
}
