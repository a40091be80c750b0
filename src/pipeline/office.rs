//! Office backend: Word, Excel, PowerPoint, OpenDocument and RTF to PDF via
//! a headless LibreOffice.
//!
//! LibreOffice writes `<stem>.pdf` into the requested output directory. Some
//! builds normalise the stem (e.g. non-ASCII file names), so when the
//! expected file is missing but the directory holds exactly one PDF, that
//! one is taken.

use crate::error::DocPipeError;
use crate::pipeline::command;
use crate::pipeline::pdf::{self, PdfSource, RenderSettings};
use image::DynamicImage;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Executables tried, in order.
pub const OFFICE_BINARIES: &[&str] = &["soffice", "libreoffice"];

/// Whether a LibreOffice executable is on `PATH`.
pub fn is_available() -> bool {
    command::which_first(OFFICE_BINARIES).is_some()
}

/// Convert `input` to PDF inside `out_dir` and return the PDF's path.
pub async fn to_pdf(input: &Path, out_dir: &Path, timeout: Duration) -> Result<PathBuf, DocPipeError> {
    let soffice = command::which_first(OFFICE_BINARIES).ok_or_else(|| DocPipeError::ToolMissing {
        candidates: OFFICE_BINARIES.iter().map(|s| s.to_string()).collect(),
        hint: "LibreOffice is required to convert Office documents to PDF; install libreoffice"
            .to_string(),
    })?;

    info!("Converting {} to PDF with {}", input.display(), soffice.display());

    let args: Vec<OsString> = vec![
        "--headless".into(),
        "--convert-to".into(),
        "pdf".into(),
        "--outdir".into(),
        out_dir.as_os_str().to_owned(),
        input.as_os_str().to_owned(),
    ];
    command::run(&soffice, args, timeout).await?;

    locate_output(input, out_dir)
}

/// Convert to PDF, then rasterise with the PDF backend.
pub async fn to_pages(
    input: &Path,
    out_dir: &Path,
    timeout: Duration,
    settings: RenderSettings,
) -> Result<Vec<DynamicImage>, DocPipeError> {
    let pdf_path = to_pdf(input, out_dir, timeout).await?;
    pdf::to_pages(PdfSource::Path(pdf_path), settings).await
}

/// Find the converter's output: `<stem>.pdf`, else the only `*.pdf` present.
pub fn locate_output(input: &Path, out_dir: &Path) -> Result<PathBuf, DocPipeError> {
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push(".pdf");
    let expected = out_dir.join(name);
    if expected.is_file() {
        return Ok(expected);
    }

    let entries = std::fs::read_dir(out_dir).map_err(|e| DocPipeError::io(out_dir, e))?;
    let candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();

    match candidates.as_slice() {
        [only] => Ok(only.clone()),
        _ => Err(DocPipeError::ConverterOutputMissing {
            dir: out_dir.to_path_buf(),
            detail: format!(
                "expected {} and found {} other PDF file(s)",
                expected.display(),
                candidates.len()
            ),
        }),
    }
}
