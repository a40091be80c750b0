//! Object storage: the [`ObjectStore`] seam, `s3://` URIs and the key
//! layout shared by uploads, source resolution and task artifacts.
//!
//! Keys are bit-exact; other services read the same layout:
//!
//! ```text
//! {owner}/source_files/{file}/{filename}      canonical upload
//! uploads/{file}/{filename}                   legacy upload
//! {owner}/artifacts/{file}/{run}/{subpath}    task output
//! ```

pub mod local;
pub mod memory;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

use crate::error::DocPipeError;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// URI scheme for stored objects.
pub const URI_SCHEME: &str = "s3://";

/// A bucket/key object store.
///
/// `get` distinguishes a missing object (`Ok(None)`) from a failing store
/// (`Err`), which the source resolver relies on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// The bucket `put` writes to.
    fn bucket(&self) -> &str;

    /// Fetch `bucket/key`.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, DocPipeError>;

    /// Store `data` at `key` in the default bucket and return its URI.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String, DocPipeError>;
}

// ── URIs ─────────────────────────────────────────────────────────────────

/// A parsed `s3://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageUri {
    pub bucket: String,
    pub key: String,
}

impl StorageUri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `s3://bucket/key`. Both parts must be non-empty.
    pub fn parse(uri: &str) -> Result<Self, DocPipeError> {
        let invalid = || DocPipeError::InvalidStorageUri(uri.to_string());
        let rest = uri.strip_prefix(URI_SCHEME).ok_or_else(invalid)?;
        let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;
        if bucket.is_empty() || key.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(bucket, key))
    }
}

impl FromStr for StorageUri {
    type Err = DocPipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", URI_SCHEME, self.bucket, self.key)
    }
}

// ── Key layout ───────────────────────────────────────────────────────────

/// Canonical key of an uploaded source file.
pub fn source_key(owner_id: &str, file_id: &str, filename: &str) -> String {
    format!("{owner_id}/source_files/{file_id}/{filename}")
}

/// Key used by uploads made before owner-scoped storage.
pub fn legacy_key(file_id: &str, filename: &str) -> String {
    format!("uploads/{file_id}/{filename}")
}

/// Prefix under which a run stores its artifacts (no trailing slash).
fn artifact_prefix(owner_id: &str, file_id: &str, run_id: &str) -> String {
    format!("{owner_id}/artifacts/{file_id}/{run_id}")
}

/// Key of one artifact: `{owner}/artifacts/{file}/{run}/{subpath}`.
pub fn artifact_key(owner_id: &str, file_id: &str, run_id: &str, subpath: &str) -> String {
    format!(
        "{}/{}",
        artifact_prefix(owner_id, file_id, run_id),
        subpath.trim_start_matches('/')
    )
}
