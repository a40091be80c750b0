//! Conversion routing: detected type → strategy.
//!
//! Families are tested in a fixed order (PDF, Office, HTML, Image) and the
//! first match wins. Each family matches on any one of three signals: the
//! content label, the MIME type, or the path extension. When the caller
//! wants a PDF and the source already is one, or can be turned into one
//! without rasterising (Office, HTML), the route is [`Route::DirectPdf`].

use crate::config::ReturnMode;
use crate::detect::DetectedType;
use crate::error::DocPipeError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Family tables ────────────────────────────────────────────────────────

pub const OFFICE_LABELS: &[&str] = &[
    "doc", "docx", "ppt", "pptx", "xls", "xlsx", "odt", "odp", "ods", "rtf",
];

pub const OFFICE_MIMES: &[&str] = &[
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/rtf",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.presentation",
    "application/vnd.oasis.opendocument.spreadsheet",
];

pub const OFFICE_EXTS: &[&str] = &[
    ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx", ".odt", ".odp", ".ods", ".rtf",
];

pub const HTML_LABELS: &[&str] = &["html", "htm"];
pub const HTML_EXTS: &[&str] = &[".html", ".htm"];

pub const IMAGE_LABELS: &[&str] = &["png", "jpeg", "jpg", "webp", "tiff", "bmp"];
pub const IMAGE_EXTS: &[&str] = &[".png", ".jpg", ".jpeg", ".tiff", ".tif", ".webp", ".bmp"];

/// Extensions that say nothing about the content.
const GENERIC_EXTS: &[&str] = &["", ".bin"];

/// Strategy family a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    Pdf,
    Office,
    Html,
    Image,
    /// Unrecognised content with a meaningful extension; handed to the
    /// office converter as a last attempt.
    Fallback,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::Pdf => "pdf",
            Family::Office => "office",
            Family::Html => "html",
            Family::Image => "image",
            Family::Fallback => "fallback",
        })
    }
}

/// The chosen conversion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    /// Produce PDF bytes without rasterising.
    DirectPdf(Family),
    /// Produce page rasters, then assemble them per the return mode.
    Rasterize(Family),
}

impl Route {
    pub fn family(self) -> Family {
        match self {
            Route::DirectPdf(f) | Route::Rasterize(f) => f,
        }
    }
}

/// Pick a conversion route. Pure; touches no I/O.
///
/// `ext_hint` is the lower-cased extension with leading dot, when known.
pub fn route(
    detected: &DetectedType,
    ext_hint: Option<&str>,
    mode: ReturnMode,
) -> Result<Route, DocPipeError> {
    let label = detected.family_label();
    let mime = detected.mime.as_str();
    let ext = ext_hint.unwrap_or("");

    let in_labels = |set: &[&str]| label.is_some_and(|l| set.contains(&l));
    let in_exts = |set: &[&str]| set.contains(&ext);

    let family = if in_labels(&["pdf"]) || mime == "application/pdf" || ext == ".pdf" {
        Some(Family::Pdf)
    } else if in_labels(OFFICE_LABELS) || OFFICE_MIMES.contains(&mime) || in_exts(OFFICE_EXTS) {
        Some(Family::Office)
    } else if in_labels(HTML_LABELS) || mime == "text/html" || in_exts(HTML_EXTS) {
        Some(Family::Html)
    } else if in_labels(IMAGE_LABELS) || mime.starts_with("image/") || in_exts(IMAGE_EXTS) {
        Some(Family::Image)
    } else {
        None
    };

    match family {
        Some(f @ (Family::Pdf | Family::Office | Family::Html)) if mode == ReturnMode::Pdf => {
            Ok(Route::DirectPdf(f))
        }
        Some(f) => Ok(Route::Rasterize(f)),
        None if !GENERIC_EXTS.contains(&ext) => Ok(Route::Rasterize(Family::Fallback)),
        None => Err(DocPipeError::Unsupported {
            label: detected.label.clone(),
            mime: detected.mime.clone(),
            ext: ext.to_string(),
            source_kind: detected.source.to_string(),
        }),
    }
}
