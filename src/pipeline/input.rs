//! Input handling: the [`SourceDocument`] a caller hands us, and the on-disk
//! view of it that external converters need.
//!
//! Office and HTML converters are separate processes that only accept file
//! paths, so byte inputs are spilled into a private `doc2img-` temp directory.
//! The directory lives exactly as long as the [`Workspace`]; dropping it
//! removes every intermediate file, on success and on error alike.

use crate::detect::DetectedType;
use crate::error::DocPipeError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// A document to convert: an in-memory buffer or a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDocument {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl From<Vec<u8>> for SourceDocument {
    fn from(bytes: Vec<u8>) -> Self {
        SourceDocument::Bytes(bytes)
    }
}

impl From<&[u8]> for SourceDocument {
    fn from(bytes: &[u8]) -> Self {
        SourceDocument::Bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for SourceDocument {
    fn from(path: PathBuf) -> Self {
        SourceDocument::Path(path)
    }
}

impl From<&Path> for SourceDocument {
    fn from(path: &Path) -> Self {
        SourceDocument::Path(path.to_path_buf())
    }
}

impl SourceDocument {
    /// The filesystem path, when the source is a file.
    pub fn path(&self) -> Option<&Path> {
        match self {
            SourceDocument::Path(p) => Some(p),
            SourceDocument::Bytes(_) => None,
        }
    }

    /// Lower-cased extension of the source path with its leading dot
    /// (`.docx`), or `None` for byte inputs and extension-less paths.
    pub fn extension_hint(&self) -> Option<String> {
        self.path().and_then(extension_of)
    }

    /// Reject inputs no backend can do anything with.
    ///
    /// A missing path is [`DocPipeError::FileNotFound`]; a zero-length
    /// buffer or file is [`DocPipeError::EmptyInput`].
    pub fn ensure_readable(&self) -> Result<(), DocPipeError> {
        match self {
            SourceDocument::Bytes(b) if b.is_empty() => Err(DocPipeError::EmptyInput),
            SourceDocument::Bytes(_) => Ok(()),
            SourceDocument::Path(p) => {
                let meta = std::fs::metadata(p).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => DocPipeError::FileNotFound { path: p.clone() },
                    _ => DocPipeError::io(p, e),
                })?;
                if !meta.is_file() {
                    return Err(DocPipeError::FileNotFound { path: p.clone() });
                }
                if meta.len() == 0 {
                    return Err(DocPipeError::EmptyInput);
                }
                Ok(())
            }
        }
    }

    /// Read the whole document into memory.
    pub async fn read_all(&self) -> Result<Vec<u8>, DocPipeError> {
        match self {
            SourceDocument::Bytes(b) => Ok(b.clone()),
            SourceDocument::Path(p) => tokio::fs::read(p).await.map_err(|e| DocPipeError::io(p, e)),
        }
    }
}

/// Lower-cased extension with leading dot, e.g. `.pdf`.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

/// Extension given to a spilled byte buffer so that external tools which
/// key off the file name see the right type.
///
/// Only the MIME types with a direct conversion path map to a real
/// extension; everything else gets `.bin`, which routing treats as generic.
pub fn spill_extension(detected: &DetectedType) -> String {
    let ext = match detected.mime.as_str() {
        "application/pdf" => ".pdf",
        "text/html" => ".html",
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/tiff" => ".tiff",
        "image/webp" => ".webp",
        _ => ".bin",
    };
    ext.to_string()
}

/// Private scratch directory holding the document as a file.
pub struct Workspace {
    dir: TempDir,
    input: PathBuf,
}

impl Workspace {
    /// Create a `doc2img-` temp dir and make sure the source exists as a
    /// file. Path sources are used in place; byte sources are written to
    /// `input{ext}` inside the workspace.
    pub async fn prepare(
        source: &SourceDocument,
        detected: &DetectedType,
    ) -> Result<Self, DocPipeError> {
        let dir = tempfile::Builder::new()
            .prefix("doc2img-")
            .tempdir()
            .map_err(|e| DocPipeError::Internal(format!("tempdir: {e}")))?;

        let input = match source {
            SourceDocument::Path(p) => std::path::absolute(p).map_err(|e| DocPipeError::io(p, e))?,
            SourceDocument::Bytes(bytes) => {
                let path = dir.path().join(format!("input{}", spill_extension(detected)));
                tokio::fs::write(&path, bytes)
                    .await
                    .map_err(|e| DocPipeError::io(&path, e))?;
                debug!("Spilled {} bytes to {}", bytes.len(), path.display());
                path
            }
        };

        Ok(Self { dir, input })
    }

    /// Path of the document inside (or referenced by) the workspace.
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// The scratch directory, used as converter output directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Extension of the workspace input, lower-cased with leading dot.
    pub fn input_extension(&self) -> Option<String> {
        extension_of(&self.input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectedType, DetectionSource};

    fn detected(label: &str, mime: &str) -> DetectedType {
        DetectedType {
            label: label.into(),
            mime: mime.into(),
            source: DetectionSource::Primary,
            extension_hint: None,
        }
    }

    #[test]
    fn extension_hint_is_lowercase_with_dot() {
        let doc = SourceDocument::Path(PathBuf::from("/tmp/Report.DOCX"));
        assert_eq!(doc.extension_hint().as_deref(), Some(".docx"));
        assert_eq!(SourceDocument::Bytes(vec![1]).extension_hint(), None);
        assert_eq!(
            SourceDocument::Path(PathBuf::from("/tmp/README")).extension_hint(),
            None
        );
    }

    #[test]
    fn empty_bytes_rejected() {
        let err = SourceDocument::Bytes(Vec::new()).ensure_readable().unwrap_err();
        assert!(matches!(err, DocPipeError::EmptyInput));
    }

    #[test]
    fn missing_path_rejected() {
        let err = SourceDocument::Path(PathBuf::from("/definitely/not/here.pdf"))
            .ensure_readable()
            .unwrap_err();
        assert!(matches!(err, DocPipeError::FileNotFound { .. }));
    }

    #[test]
    fn empty_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("empty.pdf");
        std::fs::write(&p, b"").unwrap();
        let err = SourceDocument::Path(p).ensure_readable().unwrap_err();
        assert!(matches!(err, DocPipeError::EmptyInput));
    }

    #[test]
    fn spill_extension_maps_convertible_mimes_only() {
        assert_eq!(spill_extension(&detected("pdf", "application/pdf")), ".pdf");
        assert_eq!(spill_extension(&detected("jpeg", "image/jpeg")), ".jpg");
        assert_eq!(spill_extension(&detected("html", "text/html")), ".html");
        assert_eq!(spill_extension(&detected("gz", "application/gzip")), ".bin");
        assert_eq!(spill_extension(&detected("zip", "application/zip")), ".bin");
        assert_eq!(
            spill_extension(&detected(
                "docx",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            )),
            ".bin"
        );
        assert_eq!(
            spill_extension(&detected("application/octet-stream", "application/octet-stream")),
            ".bin"
        );
    }

    #[tokio::test]
    async fn workspace_spills_bytes_and_cleans_up() {
        let doc = SourceDocument::Bytes(b"%PDF-1.4 test".to_vec());
        let ws = Workspace::prepare(&doc, &detected("pdf", "application/pdf"))
            .await
            .unwrap();
        let dir = ws.dir().to_path_buf();
        assert!(ws.input().starts_with(&dir));
        assert_eq!(ws.input_extension().as_deref(), Some(".pdf"));
        assert_eq!(std::fs::read(ws.input()).unwrap(), b"%PDF-1.4 test");
        drop(ws);
        assert!(!dir.exists());
    }
}
