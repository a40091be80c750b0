//! The handler seam: what a task implementation receives and must provide.

use crate::convert::Converter;
use crate::error::DocPipeError;
use crate::records::{FileRecord, RecordStore};
use crate::storage::ObjectStore;
use crate::task::run::TaskRun;
use async_trait::async_trait;

/// Everything a handler may touch while executing one run.
pub struct TaskContext<'a> {
    pub run: &'a TaskRun,
    pub file: &'a FileRecord,
    pub objects: &'a dyn ObjectStore,
    pub records: &'a dyn RecordStore,
    pub converter: &'a Converter,
}

impl TaskContext<'_> {
    /// Artifact key for this run: `{owner}/artifacts/{file}/{run}/{subpath}`.
    pub fn artifact_key(&self, subpath: &str) -> String {
        crate::storage::artifact_key(&self.file.owner_id, &self.file.id, &self.run.id, subpath)
    }
}

/// A named unit of work run against a file's bytes.
///
/// Handlers write their own artifacts; any error marks the run Failed.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Registry key. Matched case-insensitively after trimming.
    fn name(&self) -> &str;

    async fn run(&self, ctx: &TaskContext<'_>, data: &[u8]) -> Result<(), DocPipeError>;
}
