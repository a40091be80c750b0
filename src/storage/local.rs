//! Filesystem-backed [`ObjectStore`]: `{root}/{bucket}/{key}`.
//!
//! Used by the CLI so a single machine can run the whole task pipeline
//! without an S3 endpoint. Content types are not persisted.

use super::{ObjectStore, StorageUri};
use crate::error::DocPipeError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map `bucket/key` onto the filesystem, refusing anything that would
    /// escape the root.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, DocPipeError> {
        let escapes = |s: &str| {
            Path::new(s)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        };
        if bucket.is_empty() || key.is_empty() || escapes(bucket) || escapes(key) {
            return Err(DocPipeError::Storage {
                bucket: bucket.to_string(),
                key: key.to_string(),
                detail: "key must be a relative path without '..' components".to_string(),
            });
        }
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, DocPipeError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DocPipeError::Storage {
                bucket: bucket.to_string(),
                key: key.to_string(),
                detail: e.to_string(),
            }),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<String, DocPipeError> {
        let path = self.object_path(&self.bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DocPipeError::io(parent, e))?;
        }
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| DocPipeError::io(&path, e))?;
        debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(StorageUri::new(&self.bucket, key).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_under_root_bucket_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "bkt");
        let uri = store.put("o/source_files/f/a b.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(uri, "s3://bkt/o/source_files/f/a b.pdf");
        assert!(dir.path().join("bkt/o/source_files/f/a b.pdf").is_file());
        assert_eq!(
            store.get("bkt", "o/source_files/f/a b.pdf").await.unwrap(),
            Some(b"%PDF".to_vec())
        );
    }

    #[tokio::test]
    async fn missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "bkt");
        assert_eq!(store.get("bkt", "nothing/here").await.unwrap(), None);
    }

    #[tokio::test]
    async fn traversal_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "bkt");
        for key in ["../x", "a/../../x", "/etc/passwd"] {
            assert!(
                matches!(store.get("bkt", key).await, Err(DocPipeError::Storage { .. })),
                "{key}"
            );
        }
        assert!(store.put("../x", vec![1], "x").await.is_err());
    }
}
