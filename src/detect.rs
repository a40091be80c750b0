//! Content-type classification for unknown documents.
//!
//! Three signals are consulted, strongest first:
//!
//! 1. **Primary**: content inspection with [`infer`] (magic numbers, OOXML
//!    and ODF container probes, HTML markup). Yields a family label such as
//!    `pdf`, `docx` or `png`.
//! 2. **MimeGuess**: only for path inputs the content classifier could not
//!    place; the extension is mapped through [`mime_guess`].
//! 3. **Sniff**: only for byte inputs; a handful of hard-coded magic
//!    prefixes.
//!
//! Classification never fails. Unknown content comes back as
//! `application/octet-stream` and the router decides what to do with it.

use crate::pipeline::input::SourceDocument;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Generic MIME type for unclassifiable content.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// How many leading bytes of a file the content classifier inspects.
const HEAD_LEN: u64 = 8192;

/// Which signal produced a [`DetectedType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionSource {
    Primary,
    MimeGuess,
    Sniff,
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectionSource::Primary => "PRIMARY",
            DetectionSource::MimeGuess => "MIME_GUESS",
            DetectionSource::Sniff => "SNIFF",
        })
    }
}

/// Result of classifying one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedType {
    /// Family label (`pdf`, `docx`, …) for [`DetectionSource::Primary`],
    /// otherwise the MIME string itself.
    pub label: String,
    /// MIME type. Equals `label` for non-primary detections.
    pub mime: String,
    pub source: DetectionSource,
    /// Lower-cased path extension with leading dot. Corroborating only.
    pub extension_hint: Option<String>,
}

impl DetectedType {
    /// The family label when content inspection succeeded.
    pub fn family_label(&self) -> Option<&str> {
        (self.source == DetectionSource::Primary).then_some(self.label.as_str())
    }

    fn primary(kind: infer::Type, extension_hint: Option<String>) -> Self {
        Self {
            label: normalise_label(kind.extension()).to_string(),
            mime: kind.mime_type().to_string(),
            source: DetectionSource::Primary,
            extension_hint,
        }
    }

    fn from_mime(mime: &str, source: DetectionSource, extension_hint: Option<String>) -> Self {
        Self {
            label: mime.to_string(),
            mime: mime.to_string(),
            source,
            extension_hint,
        }
    }
}

/// Classify a document. Infallible.
pub fn classify(doc: &SourceDocument) -> DetectedType {
    let detected = match doc {
        SourceDocument::Bytes(bytes) => classify_bytes(bytes),
        SourceDocument::Path(path) => classify_path(path),
    };
    debug!(
        "Classified as {} ({}, mime {}, ext {:?})",
        detected.label, detected.source, detected.mime, detected.extension_hint
    );
    detected
}

/// Classify an in-memory buffer: content inspection, then magic sniffing.
pub fn classify_bytes(bytes: &[u8]) -> DetectedType {
    match infer::get(bytes) {
        Some(kind) => DetectedType::primary(kind, None),
        None => DetectedType::from_mime(sniff(bytes), DetectionSource::Sniff, None),
    }
}

/// Classify a file: content inspection of its head, then extension lookup.
pub fn classify_path(path: &Path) -> DetectedType {
    let ext = crate::pipeline::input::extension_of(path);

    if let Some(kind) = read_head(path).as_deref().and_then(infer::get) {
        return DetectedType::primary(kind, ext);
    }

    let mime = mime_guess::from_path(path).first_raw().unwrap_or(OCTET_STREAM);
    DetectedType::from_mime(mime, DetectionSource::MimeGuess, ext)
}

/// Last-resort magic-prefix check for buffers.
pub fn sniff(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"%PDF") {
        "application/pdf"
    } else if bytes.starts_with(b"\x89PNG") {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        "image/tiff"
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        OCTET_STREAM
    }
}

fn read_head(path: &Path) -> Option<Vec<u8>> {
    let file = std::fs::File::open(path).ok()?;
    let mut head = Vec::with_capacity(HEAD_LEN as usize);
    file.take(HEAD_LEN).read_to_end(&mut head).ok()?;
    Some(head)
}

fn normalise_label(ext: &str) -> &str {
    match ext {
        "jpg" => "jpeg",
        "tif" => "tiff",
        other => other,
    }
}
