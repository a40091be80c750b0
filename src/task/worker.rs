//! The worker: drives task runs through their lifecycle.

use crate::convert::Converter;
use crate::error::DocPipeError;
use crate::records::{FileRecord, RecordStore};
use crate::resolve;
use crate::storage::ObjectStore;
use crate::task::handler::TaskContext;
use crate::task::handlers::to_pdf;
use crate::task::registry::TaskRegistry;
use crate::task::run::TaskRun;
use crate::task::TaskTrigger;
use chrono::Utc;
use serde_json::Map;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// What [`Worker::run_task`] did with a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run is unknown or already terminal; nothing was touched.
    Skipped,
    /// The target file is gone; the run was marked Failed.
    FileMissing,
    Succeeded,
}

pub struct Worker {
    registry: Arc<TaskRegistry>,
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    converter: Converter,
}

impl Worker {
    pub fn new(
        registry: Arc<TaskRegistry>,
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            registry,
            objects,
            records,
            converter: Converter::new(),
        }
    }

    /// Use `converter` for handler conversions instead of the default one.
    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Execute run `task_run_id` to a terminal state.
    ///
    /// # Errors
    /// The handler's (or resolution's) error after the run has been marked
    /// Failed, or a record-store error.
    pub async fn run_task(&self, task_run_id: &str) -> Result<RunOutcome, DocPipeError> {
        let Some(mut run) = self.records.get_run(task_run_id).await? else {
            warn!("Task run {} not found; ignoring trigger", task_run_id);
            return Ok(RunOutcome::Skipped);
        };
        if run.status.is_terminal() {
            info!("Task run {} already {}; ignoring trigger", run.id, run.status);
            return Ok(RunOutcome::Skipped);
        }

        let file = self
            .records
            .get_file(&run.file_id)
            .await?
            .filter(FileRecord::is_live);
        let Some(file) = file else {
            warn!("Task run {}: file {} not found", run.id, run.file_id);
            run.mark_failed(Utc::now(), "file not found")?;
            self.records.update_run(&run).await?;
            return Ok(RunOutcome::FileMissing);
        };

        run.mark_running(Utc::now())?;
        self.records.update_run(&run).await?;
        info!("Task run {} ({}) started on file {}", run.id, run.name, file.id);

        match self.execute(&run, &file).await {
            Ok(()) => {
                run.mark_succeeded(Utc::now())?;
                self.records.update_run(&run).await?;
                info!("Task run {} succeeded", run.id);
                Ok(RunOutcome::Succeeded)
            }
            Err(e) => {
                error!("Task run {} failed: {}", run.id, e);
                run.mark_failed(Utc::now(), e.to_string())?;
                self.records.update_run(&run).await?;
                Err(e)
            }
        }
    }

    async fn execute(&self, run: &TaskRun, file: &FileRecord) -> Result<(), DocPipeError> {
        let source = resolve::resolve(self.objects.as_ref(), self.objects.bucket(), file).await?;
        if source.attempts.len() > 1 {
            warn!(
                "Task run {}: source of file {} found at {} after {} attempt(s)",
                run.id,
                file.id,
                source.uri,
                source.attempts.len()
            );
        }
        let ctx = self.context(run, file);
        self.registry.dispatch(&ctx, &source.bytes).await
    }

    fn context<'a>(&'a self, run: &'a TaskRun, file: &'a FileRecord) -> TaskContext<'a> {
        TaskContext {
            run,
            file,
            objects: self.objects.as_ref(),
            records: self.records.as_ref(),
            converter: &self.converter,
        }
    }

    /// Consume triggers until the channel closes.
    ///
    /// Failures are logged and not retried here; a Failed run is terminal,
    /// so a redelivered trigger for it is a no-op.
    pub async fn serve(&self, mut rx: mpsc::Receiver<TaskTrigger>) {
        while let Some(trigger) = rx.recv().await {
            match self.run_task(&trigger.task_run_id).await {
                Ok(outcome) => info!(
                    "Trigger {}/{} handled: {:?}",
                    trigger.task_name, trigger.task_run_id, outcome
                ),
                Err(e) => error!(
                    "Trigger {}/{} failed: {}",
                    trigger.task_name, trigger.task_run_id, e
                ),
            }
        }
        info!("Task queue closed; worker stopping");
    }

    /// Convert a file to PDF synchronously, recording a `to_pdf` run.
    ///
    /// # Errors
    /// - [`DocPipeError::FileNotFound`] when the file is unknown or deleted
    /// - [`DocPipeError::SourceNotFound`] when its bytes cannot be located
    /// - the conversion error, after the run has been marked Failed
    pub async fn to_pdf_sync(&self, file_id: &str) -> Result<Vec<u8>, DocPipeError> {
        let file = self
            .records
            .get_file(file_id)
            .await?
            .filter(FileRecord::is_live)
            .ok_or_else(|| DocPipeError::FileNotFound { path: file_id.into() })?;
        let data = resolve::resolve_source(self.objects.as_ref(), self.objects.bucket(), &file).await?;

        let mut run = TaskRun::new(&file.id, to_pdf::NAME, Map::new());
        run.mark_running(Utc::now())?;
        self.records.insert_run(run.clone()).await?;

        let result = to_pdf::convert_and_store(&self.context(&run, &file), &data).await;
        match result {
            Ok(pdf) => {
                run.mark_succeeded(Utc::now())?;
                self.records.update_run(&run).await?;
                Ok(pdf)
            }
            Err(e) => {
                run.mark_failed(Utc::now(), e.to_string())?;
                self.records.update_run(&run).await?;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("registry", &self.registry)
            .field("bucket", &self.objects.bucket())
            .finish()
    }
}
