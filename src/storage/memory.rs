//! In-memory [`ObjectStore`] for tests and embedding.

use super::{ObjectStore, StorageUri};
use crate::error::DocPipeError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Objects kept in a map keyed by `(bucket, key)`.
#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: RwLock<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Store into any bucket, bypassing the default one.
    pub async fn insert(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All keys in `bucket` starting with `prefix`, sorted.
    pub async fn keys(&self, bucket: &str, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, DocPipeError> {
        Ok(self.object(bucket, key).await.map(|o| o.data))
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String, DocPipeError> {
        self.objects.write().await.insert(
            (self.bucket.clone(), key.to_string()),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(StorageUri::new(&self.bucket, key).to_string())
    }
}
