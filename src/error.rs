//! Error types for the edgequake-docpipe library.
//!
//! Every fallible operation returns [`DocPipeError`]. Variants are grouped by
//! the stage that produces them so a caller can match on the group it cares
//! about: bad input, tool invocation, rendering, storage, task bookkeeping.
//!
//! Classification never fails: an unknown blob is still classified (as
//! `application/octet-stream`), and only the router turns "no strategy fits"
//! into [`DocPipeError::Unsupported`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Hint attached to the "source file not found" diagnostic.
const SOURCE_NOT_FOUND_HINT: &str =
    "check that file.storage_uri, the owner id and the actual storage layout agree, \
or whether the filename contains special characters or whitespace";

/// All errors returned by the edgequake-docpipe library.
#[derive(Debug, Error)]
pub enum DocPipeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A zero-length buffer or file was submitted.
    #[error("Input is empty: nothing to convert")]
    EmptyInput,

    /// The input path, file record or task run target does not exist.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Generic I/O failure while reading or writing a local file.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Classification errors ─────────────────────────────────────────────
    /// No conversion strategy accepts the detected type.
    #[error(
        "Unsupported document type: label={label:?} mime={mime:?} ext={ext:?} (detected via {source_kind})"
    )]
    Unsupported {
        label: String,
        mime: String,
        ext: String,
        source_kind: String,
    },

    // ── External tool errors ──────────────────────────────────────────────
    /// None of the candidate executables could be found on `PATH`.
    #[error("External tool not found: tried {candidates:?}\n{hint}")]
    ToolMissing {
        candidates: Vec<String>,
        hint: String,
    },

    /// The tool did not finish within the configured timeout and was killed.
    #[error("'{program}' timed out after {secs}s")]
    ToolTimeout { program: String, secs: u64 },

    /// The tool ran but exited unsuccessfully.
    #[error("'{program}' failed with exit code {exit_code:?}\nstdout: {stdout}\nstderr: {stderr}")]
    ToolFailed {
        program: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The tool reported success but the expected output file is absent.
    #[error("Converter output not found in '{dir}': {detail}")]
    ConverterOutputMissing { dir: PathBuf, detail: String },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or its directory), place the\n\
library next to the executable, or install it system-wide.\n"
    )]
    PdfiumBinding(String),

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt or unreadable: {detail}")]
    CorruptPdf { detail: String },

    /// pdfium returned an error for a specific page (1-based).
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Raster image bytes could not be decoded.
    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    /// A page could not be encoded in the requested format.
    #[error("Image encode failed for page {page}: {detail}")]
    ImageEncode { page: usize, detail: String },

    /// Writing the ZIP archive failed.
    #[error("Archive creation failed: {0}")]
    Archive(String),

    /// Building a PDF from page images failed.
    #[error("PDF assembly failed: {0}")]
    PdfAssembly(String),

    /// The backend produced zero pages.
    #[error("No pages were produced from the document")]
    NoPages,

    // ── Storage errors ────────────────────────────────────────────────────
    /// Every candidate location for a file's bytes was tried and missed.
    #[error(
        "Source file not found in storage after {} attempt(s): {}",
        .attempts.len(),
        describe_attempts(.attempts)
    )]
    SourceNotFound { attempts: Vec<SourceAttempt> },

    /// The object store reported a failure other than "missing".
    #[error("Storage error for '{bucket}/{key}': {detail}")]
    Storage {
        bucket: String,
        key: String,
        detail: String,
    },

    /// A storage URI was not of the form `s3://bucket/key`.
    #[error("Invalid storage URI '{0}': expected s3://<bucket>/<key>")]
    InvalidStorageUri(String),

    // ── Task errors ───────────────────────────────────────────────────────
    /// No handler is registered under the run's task name.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// A second handler tried to register under an existing name.
    #[error("handler already registered: {0}")]
    HandlerAlreadyRegistered(String),

    /// A state transition was attempted from a state that does not allow it.
    #[error("Invalid task run transition for {run_id}: {from} -> {to}")]
    InvalidTransition {
        run_id: String,
        from: String,
        to: String,
    },

    /// The task run id is unknown to the record store.
    #[error("Task run not found: {0}")]
    TaskRunNotFound(String),

    /// A task run carried parameters the handler cannot interpret.
    #[error("Invalid task parameters: {0}")]
    InvalidParams(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// One storage location tried while resolving a file's source bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttempt {
    pub bucket: String,
    pub key: String,
    /// Which rule produced this candidate (`db.storage_uri`, `new_rule`, `old_rule`).
    pub from: String,
    /// Failure detail when the store errored rather than reporting a miss.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `from=bucket/key` for each attempt, `; `-separated, with any store error.
fn describe_attempts(attempts: &[SourceAttempt]) -> String {
    attempts
        .iter()
        .map(|a| match &a.error {
            Some(err) => format!("{}={}/{} ({})", a.from, a.bucket, a.key, err),
            None => format!("{}={}/{}", a.from, a.bucket, a.key),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl DocPipeError {
    /// Convenience constructor for [`DocPipeError::Io`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocPipeError::Io {
            path: path.into(),
            source,
        }
    }

    /// Structured payload for a "source not found" failure:
    /// `{ message, tried: [{bucket, key, from}], hint }`.
    ///
    /// Returns `None` for every other variant.
    pub fn diagnostic(&self) -> Option<serde_json::Value> {
        match self {
            DocPipeError::SourceNotFound { attempts } => {
                let tried: Vec<serde_json::Value> = attempts
                    .iter()
                    .map(|a| {
                        serde_json::json!({
                            "bucket": a.bucket,
                            "key": a.key,
                            "from": a.from,
                        })
                    })
                    .collect();
                Some(serde_json::json!({
                    "message": "source file not found in storage",
                    "tried": tried,
                    "hint": SOURCE_NOT_FOUND_HINT,
                }))
            }
            _ => None,
        }
    }
}

/// Library-wide result alias.
pub type Result<T, E = DocPipeError> = std::result::Result<T, E>;
