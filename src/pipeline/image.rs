//! Image backend: a raster file becomes exactly one RGBA page.

use crate::config::Rgba;
use crate::error::DocPipeError;
use crate::pipeline::raster;
use image::{DynamicImage, ImageReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decode the image at `path` into a single page.
///
/// The page is converted to RGBA8, then the optional background and size
/// cap are applied exactly as for rendered PDF pages.
pub async fn to_pages(
    path: &Path,
    background: Option<Rgba>,
    max_side: Option<u32>,
) -> Result<Vec<DynamicImage>, DocPipeError> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let page = load_blocking(&path)?;
        Ok(vec![raster::finish_page(page, background, max_side)])
    })
    .await
    .map_err(|e| DocPipeError::Internal(format!("Image decode task panicked: {}", e)))?
}

fn load_blocking(path: &Path) -> Result<DynamicImage, DocPipeError> {
    let reader = ImageReader::open(path)
        .map_err(|e| DocPipeError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| DocPipeError::io(path, e))?;
    let decoded = reader
        .decode()
        .map_err(|e| DocPipeError::ImageDecode(format!("{}: {}", path.display(), e)))?;
    debug!(
        "Decoded {} → {}x{} px",
        path.display(),
        decoded.width(),
        decoded.height()
    );
    Ok(DynamicImage::ImageRgba8(decoded.into_rgba8()))
}
