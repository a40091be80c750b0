//! PDF backend: rasterise pages via pdfium, and build PDFs from page images.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is CPU-bound
//! and not async-aware. `tokio::task::spawn_blocking` moves the work onto the
//! blocking thread pool so Tokio worker threads never stall mid-render.
//!
//! ## Resolution
//!
//! Pages are rendered at `dpi / 72` pixels per PDF point with a transparent
//! clear colour, so untouched page areas keep alpha until a background is
//! composited by [`raster::finish_page`].

use crate::config::Rgba;
use crate::error::DocPipeError;
use crate::pipeline::{engine, raster};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Where the PDF bytes come from.
#[derive(Debug, Clone)]
pub enum PdfSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// Rasterisation knobs shared by every PDF-backed strategy.
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub dpi: u32,
    pub max_side: Option<u32>,
    pub background: Option<Rgba>,
}

/// Rasterise every page of a PDF, in document order.
pub async fn to_pages(
    source: PdfSource,
    settings: RenderSettings,
) -> Result<Vec<DynamicImage>, DocPipeError> {
    tokio::task::spawn_blocking(move || render_pages_blocking(&source, settings))
        .await
        .map_err(|e| DocPipeError::Internal(format!("Render task panicked: {}", e)))?
}

/// Number of pages in a PDF.
pub async fn page_count(source: PdfSource) -> Result<usize, DocPipeError> {
    tokio::task::spawn_blocking(move || {
        let pdfium = engine::pdfium()?;
        let document = open(pdfium, &source)?;
        Ok(document.pages().len() as usize)
    })
    .await
    .map_err(|e| DocPipeError::Internal(format!("Page count task panicked: {}", e)))?
}

/// Build a PDF with one page per image.
///
/// Each page measures `px / dpi * 72` points per axis, so printing at `dpi`
/// reproduces the original physical size. Images are embedded as RGB.
pub async fn images_to_pdf(pages: Vec<DynamicImage>, dpi: u32) -> Result<Vec<u8>, DocPipeError> {
    tokio::task::spawn_blocking(move || images_to_pdf_blocking(&pages, dpi))
        .await
        .map_err(|e| DocPipeError::Internal(format!("PDF assembly task panicked: {}", e)))?
}

// ── Blocking implementations ─────────────────────────────────────────────

fn open<'a>(pdfium: &'a Pdfium, source: &PdfSource) -> Result<PdfDocument<'a>, DocPipeError> {
    let loaded = match source {
        PdfSource::Bytes(bytes) => pdfium.load_pdf_from_byte_vec(bytes.clone(), None),
        PdfSource::Path(path) => pdfium.load_pdf_from_file(path, None),
    };
    loaded.map_err(|e| DocPipeError::CorruptPdf {
        detail: format!("{:?}", e),
    })
}

fn render_pages_blocking(
    source: &PdfSource,
    settings: RenderSettings,
) -> Result<Vec<DynamicImage>, DocPipeError> {
    let pdfium = engine::pdfium()?;
    let document = open(pdfium, source)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(settings.dpi as f32 / 72.0)
        .set_clear_color(PdfColor::new(255, 255, 255, 0))
        .render_form_data(true);

    let mut results = Vec::with_capacity(total_pages);

    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            DocPipeError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = raster::finish_page(bitmap.as_image(), settings.background, settings.max_side);
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push(image);
    }

    Ok(results)
}

fn images_to_pdf_blocking(pages: &[DynamicImage], dpi: u32) -> Result<Vec<u8>, DocPipeError> {
    let assembly = |e: PdfiumError| DocPipeError::PdfAssembly(format!("{:?}", e));

    let pdfium = engine::pdfium()?;
    let mut document = pdfium.create_new_pdf().map_err(assembly)?;
    let points = |px: u32| PdfPoints::new(px as f32 / dpi as f32 * 72.0);

    for (idx, img) in pages.iter().enumerate() {
        let (w, h) = (points(img.width()), points(img.height()));
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(w, h))
            .map_err(assembly)?;

        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        page.objects_mut()
            .create_image_object(PdfPoints::ZERO, PdfPoints::ZERO, &rgb, Some(w), Some(h))
            .map_err(assembly)?;

        debug!(
            "Embedded page {} ({}x{} px → {:.1}x{:.1} pt)",
            idx + 1,
            img.width(),
            img.height(),
            w.value,
            h.value
        );
    }

    document.save_to_bytes().map_err(assembly)
}
