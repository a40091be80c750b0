//! HTML backend: HTML to PDF through an embedded renderer when one is
//! configured, otherwise through a headless Chrome/Chromium.
//!
//! The browser prints into its own `html2pdf-` temp directory; the result is
//! copied to the requested target and the directory is removed on every
//! exit path.

use crate::error::DocPipeError;
use crate::pipeline::command;
use crate::pipeline::pdf::{self, PdfSource, RenderSettings};
use async_trait::async_trait;
use image::DynamicImage;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Browser executables tried, in order.
pub const BROWSER_BINARIES: &[&str] = &["google-chrome", "chromium", "chromium-browser"];

/// An in-process HTML-to-PDF renderer.
#[async_trait]
pub trait HtmlRenderer: Send + Sync {
    /// Render the HTML file at `input` into a PDF written to `out_pdf`.
    async fn render_pdf(&self, input: &Path, out_pdf: &Path) -> Result<(), DocPipeError>;
}

/// Whether a headless browser is on `PATH`.
pub fn is_available() -> bool {
    command::which_first(BROWSER_BINARIES).is_some()
}

/// Convert the HTML file `input` to a PDF at `out_pdf`.
pub async fn to_pdf(
    renderer: Option<&dyn HtmlRenderer>,
    input: &Path,
    out_pdf: &Path,
    timeout: Duration,
) -> Result<PathBuf, DocPipeError> {
    if let Some(renderer) = renderer {
        renderer.render_pdf(input, out_pdf).await?;
        if !out_pdf.is_file() {
            return Err(DocPipeError::ConverterOutputMissing {
                dir: out_pdf.parent().unwrap_or(Path::new(".")).to_path_buf(),
                detail: format!("HTML renderer did not write {}", out_pdf.display()),
            });
        }
        return Ok(out_pdf.to_path_buf());
    }

    let browser = command::which_first(BROWSER_BINARIES).ok_or_else(|| DocPipeError::ToolMissing {
        candidates: BROWSER_BINARIES.iter().map(|s| s.to_string()).collect(),
        hint: "No HTML renderer configured and no Chrome/Chromium found; install one of them"
            .to_string(),
    })?;

    let scratch = tempfile::Builder::new()
        .prefix("html2pdf-")
        .tempdir()
        .map_err(|e| DocPipeError::Internal(format!("tempdir: {e}")))?;
    let printed = scratch.path().join("out.pdf");

    info!("Printing {} to PDF with {}", input.display(), browser.display());

    let mut print_flag = OsString::from("--print-to-pdf=");
    print_flag.push(printed.as_os_str());
    let args: Vec<OsString> = vec!["--headless".into(), print_flag, input.as_os_str().to_owned()];
    command::run(&browser, args, timeout).await?;

    if !printed.is_file() {
        return Err(DocPipeError::ConverterOutputMissing {
            dir: scratch.path().to_path_buf(),
            detail: "browser exited successfully but printed no PDF".to_string(),
        });
    }

    tokio::fs::copy(&printed, out_pdf)
        .await
        .map_err(|e| DocPipeError::io(out_pdf, e))?;
    Ok(out_pdf.to_path_buf())
}

/// Convert to PDF, then rasterise with the PDF backend.
pub async fn to_pages(
    renderer: Option<&dyn HtmlRenderer>,
    input: &Path,
    out_pdf: &Path,
    timeout: Duration,
    settings: RenderSettings,
) -> Result<Vec<DynamicImage>, DocPipeError> {
    let pdf_path = to_pdf(renderer, input, out_pdf, timeout).await?;
    pdf::to_pages(PdfSource::Path(pdf_path), settings).await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubRenderer {
        write: bool,
    }

    #[async_trait]
    impl HtmlRenderer for StubRenderer {
        async fn render_pdf(&self, _input: &Path, out_pdf: &Path) -> Result<(), DocPipeError> {
            if self.write {
                tokio::fs::write(out_pdf, b"%PDF-1.4 stub")
                    .await
                    .map_err(|e| DocPipeError::io(out_pdf, e))?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn configured_renderer_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.html");
        std::fs::write(&input, "<html><body>x</body></html>").unwrap();
        let out = dir.path().join("from_html.pdf");

        let stub = StubRenderer { write: true };
        let path = to_pdf(Some(&stub), &input, &out, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(path, out);
        assert_eq!(std::fs::read(&out).unwrap(), b"%PDF-1.4 stub");
    }

    #[tokio::test]
    async fn renderer_that_writes_nothing_is_output_missing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.html");
        std::fs::write(&input, "<html></html>").unwrap();
        let out = dir.path().join("from_html.pdf");

        let stub = StubRenderer { write: false };
        let err = to_pdf(Some(&stub), &input, &out, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DocPipeError::ConverterOutputMissing { .. }));
    }
}
