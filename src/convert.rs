//! Conversion entry points.
//!
//! One call runs the whole document pipeline:
//!
//! ```text
//! SourceDocument ─▶ classify ─▶ route ─┬─▶ DirectPdf ─▶ PDF bytes
//!                                      └─▶ Rasterize ─▶ pages ─▶ assemble
//! ```
//!
//! Rasterisation is avoided whenever the caller asked for a PDF and the
//! source is a PDF, an Office document or HTML: those are returned as, or
//! converted to, a real PDF with selectable text intact.

use crate::config::{ConversionOptions, ReturnMode};
use crate::detect::{self, DetectedType};
use crate::error::DocPipeError;
use crate::pipeline::assemble::{self, ConversionResult};
use crate::pipeline::html::{self, HtmlRenderer};
use crate::pipeline::input::{self, SourceDocument, Workspace};
use crate::pipeline::pdf::{self, PdfSource, RenderSettings};
use crate::pipeline::{image as image_backend, office};
use crate::route::{self, Family, Route};
use image::DynamicImage;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// File name the HTML backend prints into inside the workspace.
const HTML_PDF_NAME: &str = "from_html.pdf";

/// Document converter.
///
/// Holds the optional pluggable pieces; cheap to clone and safe to share.
#[derive(Clone, Default)]
pub struct Converter {
    html_renderer: Option<Arc<dyn HtmlRenderer>>,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field(
                "html_renderer",
                &self.html_renderer.as_ref().map(|_| "<dyn HtmlRenderer>"),
            )
            .finish()
    }
}

/// What the converter decided to do with a document, without doing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionPlan {
    pub detected: DetectedType,
    /// Extension the router saw: the path's, or the one a byte input would
    /// be spilled with.
    pub extension: String,
    pub route: Route,
}

impl Converter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `renderer` for HTML instead of a headless browser.
    pub fn with_html_renderer(mut self, renderer: Arc<dyn HtmlRenderer>) -> Self {
        self.html_renderer = Some(renderer);
        self
    }

    /// Classify and route `source` for `mode`.
    pub fn plan(&self, source: &SourceDocument, mode: ReturnMode) -> Result<ConversionPlan, DocPipeError> {
        source.ensure_readable()?;
        let detected = detect::classify(source);
        let extension = source
            .extension_hint()
            .unwrap_or_else(|| input::spill_extension(&detected));
        let route = route::route(&detected, Some(&extension), mode)?;
        Ok(ConversionPlan {
            detected,
            extension,
            route,
        })
    }

    /// Convert `source` per `options`.
    ///
    /// # Errors
    /// - [`DocPipeError::EmptyInput`] / [`DocPipeError::FileNotFound`] for
    ///   unusable input
    /// - [`DocPipeError::Unsupported`] when no strategy fits
    /// - tool, rendering and assembly errors from the chosen backend
    pub async fn convert(
        &self,
        source: SourceDocument,
        options: &ConversionOptions,
    ) -> Result<ConversionResult, DocPipeError> {
        let start = Instant::now();
        options.validate()?;

        let plan = self.plan(&source, options.return_mode)?;
        info!(
            "Converting {} document via {:?} ({} mode)",
            plan.detected.label, plan.route, options.return_mode
        );

        let result = match plan.route {
            Route::DirectPdf(family) => {
                let bytes = self.direct_pdf(family, &source, &plan.detected, options).await?;
                ConversionResult::Pdf(bytes)
            }
            Route::Rasterize(family) => {
                let pages = self.rasterize(family, &source, &plan.detected, options).await?;
                debug!("Backend produced {} page(s)", pages.len());
                assemble::assemble(pages, options).await?
            }
        };

        info!("Conversion complete in {}ms", start.elapsed().as_millis());
        Ok(result)
    }

    /// Convert `source` to PDF bytes, rasterising only image inputs.
    pub async fn to_pdf_bytes(&self, source: SourceDocument, dpi: u32) -> Result<Vec<u8>, DocPipeError> {
        let options = ConversionOptions::builder()
            .return_mode(ReturnMode::Pdf)
            .dpi(dpi)
            .build()?;
        match self.convert(source, &options).await? {
            ConversionResult::Pdf(bytes) => Ok(bytes),
            other => Err(DocPipeError::Internal(format!(
                "PDF conversion returned {} output",
                other.mode()
            ))),
        }
    }

    // ── Strategies ───────────────────────────────────────────────────────

    async fn direct_pdf(
        &self,
        family: Family,
        source: &SourceDocument,
        detected: &DetectedType,
        options: &ConversionOptions,
    ) -> Result<Vec<u8>, DocPipeError> {
        let timeout = Duration::from_secs(options.tool_timeout_secs);
        match family {
            Family::Pdf => source.read_all().await,
            Family::Office => {
                let ws = Workspace::prepare(source, detected).await?;
                let pdf_path = office::to_pdf(ws.input(), ws.dir(), timeout).await?;
                read_file(&pdf_path).await
            }
            Family::Html => {
                let ws = Workspace::prepare(source, detected).await?;
                let target = ws.dir().join(HTML_PDF_NAME);
                let pdf_path =
                    html::to_pdf(self.html_renderer.as_deref(), ws.input(), &target, timeout).await?;
                read_file(&pdf_path).await
            }
            Family::Image | Family::Fallback => Err(DocPipeError::Internal(format!(
                "{family} documents have no direct PDF path"
            ))),
        }
    }

    async fn rasterize(
        &self,
        family: Family,
        source: &SourceDocument,
        detected: &DetectedType,
        options: &ConversionOptions,
    ) -> Result<Vec<DynamicImage>, DocPipeError> {
        let timeout = Duration::from_secs(options.tool_timeout_secs);
        let settings = RenderSettings {
            dpi: options.dpi,
            max_side: options.max_side,
            background: options.background,
        };

        match family {
            Family::Pdf => {
                let pdf_source = match source {
                    SourceDocument::Bytes(bytes) => PdfSource::Bytes(bytes.clone()),
                    SourceDocument::Path(path) => PdfSource::Path(path.clone()),
                };
                pdf::to_pages(pdf_source, settings).await
            }
            Family::Office | Family::Fallback => {
                let ws = Workspace::prepare(source, detected).await?;
                office::to_pages(ws.input(), ws.dir(), timeout, settings).await
            }
            Family::Html => {
                let ws = Workspace::prepare(source, detected).await?;
                let target = ws.dir().join(HTML_PDF_NAME);
                html::to_pages(
                    self.html_renderer.as_deref(),
                    ws.input(),
                    &target,
                    timeout,
                    settings,
                )
                .await
            }
            Family::Image => {
                let ws = Workspace::prepare(source, detected).await?;
                image_backend::to_pages(ws.input(), options.background, options.max_side).await
            }
        }
    }
}

async fn read_file(path: &std::path::Path) -> Result<Vec<u8>, DocPipeError> {
    tokio::fs::read(path).await.map_err(|e| DocPipeError::io(path, e))
}

/// Convert with a default [`Converter`].
///
/// # Example
/// ```rust,no_run
/// use edgequake_docpipe::{convert, ConversionOptions, ConversionResult, ReturnMode, SourceDocument};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let options = ConversionOptions::builder().return_mode(ReturnMode::Pdf).build()?;
/// let result = convert(SourceDocument::Path("slides.pptx".into()), &options).await?;
/// if let ConversionResult::Pdf(bytes) = result {
///     std::fs::write("slides.pdf", bytes)?;
/// }
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    source: impl Into<SourceDocument>,
    options: &ConversionOptions,
) -> Result<ConversionResult, DocPipeError> {
    Converter::new().convert(source.into(), options).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    source: impl Into<SourceDocument>,
    options: &ConversionOptions,
) -> Result<ConversionResult, DocPipeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocPipeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(source, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectionSource;

    const MINI_PDF: &[u8] = b"%PDF-1.4\n1 0 obj<<>>endobj\ntrailer<<>>\n%%EOF\n";

    fn pdf_mode() -> ConversionOptions {
        ConversionOptions::builder()
            .return_mode(ReturnMode::Pdf)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn pdf_bytes_in_pdf_mode_pass_through_unchanged() {
        let out = convert(MINI_PDF.to_vec(), &pdf_mode()).await.unwrap();
        assert_eq!(out, ConversionResult::Pdf(MINI_PDF.to_vec()));
    }

    #[tokio::test]
    async fn pdf_path_in_pdf_mode_pass_through_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("doc.pdf");
        std::fs::write(&p, MINI_PDF).unwrap();
        let out = convert(p.as_path(), &pdf_mode()).await.unwrap();
        assert_eq!(out, ConversionResult::Pdf(MINI_PDF.to_vec()));
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_any_backend() {
        let err = convert(Vec::<u8>::new(), &pdf_mode()).await.unwrap_err();
        assert!(matches!(err, DocPipeError::EmptyInput));
    }

    #[tokio::test]
    async fn unknown_bytes_are_unsupported() {
        let err = convert(vec![0xAB; 64], &ConversionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DocPipeError::Unsupported { .. }), "got {err}");
    }

    #[test]
    fn plan_for_bytes_uses_spill_extension() {
        let plan = Converter::new()
            .plan(&SourceDocument::Bytes(MINI_PDF.to_vec()), ReturnMode::Bytes)
            .unwrap();
        assert_eq!(plan.detected.source, DetectionSource::Primary);
        assert_eq!(plan.extension, ".pdf");
        assert_eq!(plan.route, Route::Rasterize(Family::Pdf));
    }

    #[tokio::test]
    async fn image_input_converts_to_archive_without_native_deps() {
        let mut png = Vec::new();
        image::RgbImage::from_pixel(8, 4, image::Rgb([1, 2, 3]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let opts = ConversionOptions::builder()
            .return_mode(ReturnMode::Bytes)
            .image_format(crate::config::ImageFormat::Jpeg)
            .build()
            .unwrap();
        let out = convert(png, &opts).await.unwrap();
        let ConversionResult::Bytes(pages) = out else {
            panic!("expected bytes");
        };
        assert_eq!(pages.len(), 1);
        assert!(pages[0].starts_with(&[0xFF, 0xD8, 0xFF]));
    }

    #[test]
    fn convert_sync_runs_outside_a_runtime() {
        let out = convert_sync(MINI_PDF.to_vec(), &pdf_mode()).unwrap();
        assert!(matches!(out, ConversionResult::Pdf(_)));
    }
}
