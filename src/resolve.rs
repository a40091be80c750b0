//! Source resolution: find a file record's bytes in object storage.
//!
//! Uploads have been stored under more than one key layout over time, so a
//! record is looked up through an ordered chain of candidate rules:
//!
//! | Tag              | Location                                        |
//! |------------------|-------------------------------------------------|
//! | `db.storage_uri` | the record's own `s3://bucket/key`              |
//! | `new_rule`       | `{owner}/source_files/{file}/{filename}`        |
//! | `old_rule`       | `uploads/{file}/{filename}`                     |
//!
//! A missing object is a soft miss and a failing store is a failed
//! candidate; both move on to the next rule. Every candidate tried is kept
//! so that exhaustion can report exactly where it looked.

use crate::error::{DocPipeError, SourceAttempt};
use crate::records::FileRecord;
use crate::storage::{self, ObjectStore, StorageUri};
use tracing::{debug, info, warn};

/// A candidate rule: the location to try for `file`, if the rule applies.
type CandidateRule = fn(&FileRecord, &str) -> Option<Result<StorageUri, String>>;

const CANDIDATES: &[(&str, CandidateRule)] = &[
    ("db.storage_uri", from_record),
    ("new_rule", canonical_location),
    ("old_rule", legacy_location),
];

fn from_record(file: &FileRecord, _bucket: &str) -> Option<Result<StorageUri, String>> {
    let uri = file.storage_uri.as_deref()?;
    Some(StorageUri::parse(uri).map_err(|_| uri.to_string()))
}

fn canonical_location(file: &FileRecord, bucket: &str) -> Option<Result<StorageUri, String>> {
    Some(Ok(StorageUri::new(
        bucket,
        storage::source_key(&file.owner_id, &file.id, &file.user_filename),
    )))
}

fn legacy_location(file: &FileRecord, bucket: &str) -> Option<Result<StorageUri, String>> {
    Some(Ok(StorageUri::new(
        bucket,
        storage::legacy_key(&file.id, &file.user_filename),
    )))
}

/// Bytes found by [`resolve`], with the trail that led to them.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub bytes: Vec<u8>,
    pub uri: StorageUri,
    /// Every candidate tried, in order; the last one is the hit.
    pub attempts: Vec<SourceAttempt>,
}

/// Fetch the source bytes of `file`, trying each candidate rule in turn.
///
/// # Errors
/// [`DocPipeError::SourceNotFound`] with every attempt when no candidate
/// yields bytes.
pub async fn resolve_source(
    store: &dyn ObjectStore,
    bucket: &str,
    file: &FileRecord,
) -> Result<Vec<u8>, DocPipeError> {
    resolve(store, bucket, file).await.map(|r| r.bytes)
}

/// Like [`resolve_source`], but also reports which location answered.
pub async fn resolve(
    store: &dyn ObjectStore,
    bucket: &str,
    file: &FileRecord,
) -> Result<Resolved, DocPipeError> {
    let mut attempts: Vec<SourceAttempt> = Vec::new();

    for (tag, rule) in CANDIDATES {
        let Some(candidate) = rule(file, bucket) else {
            continue;
        };
        let uri = match candidate {
            Ok(uri) => uri,
            Err(raw) => {
                warn!("File {} has an unparseable storage URI {:?}", file.id, raw);
                attempts.push(SourceAttempt {
                    bucket: String::new(),
                    key: raw.clone(),
                    from: tag.to_string(),
                    error: Some(DocPipeError::InvalidStorageUri(raw).to_string()),
                });
                continue;
            }
        };

        let fetched = store.get(&uri.bucket, &uri.key).await;
        let mut attempt = SourceAttempt {
            bucket: uri.bucket.clone(),
            key: uri.key.clone(),
            from: tag.to_string(),
            error: None,
        };
        match fetched {
            Ok(Some(bytes)) => {
                info!("Resolved file {} via {} ({})", file.id, tag, uri);
                attempts.push(attempt);
                return Ok(Resolved { bytes, uri, attempts });
            }
            Ok(None) => debug!("No object at {} ({})", uri, tag),
            Err(e) => {
                warn!("Storage error at {} ({}): {}", uri, tag, e);
                attempt.error = Some(e.to_string());
            }
        }
        attempts.push(attempt);
    }

    Err(DocPipeError::SourceNotFound { attempts })
}
