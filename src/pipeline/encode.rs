//! Image encoding: `DynamicImage` → bytes in the requested [`ImageFormat`].
//!
//! JPEG cannot carry alpha, so pages are converted to RGB8 first. Every
//! other format is written from the page as it is.

use crate::config::ImageFormat;
use crate::error::DocPipeError;
use image::DynamicImage;
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

/// Encode one page. `page` is the 1-based page number used in errors.
pub fn encode_page(
    img: &DynamicImage,
    format: ImageFormat,
    page: usize,
) -> Result<Vec<u8>, DocPipeError> {
    let prepared: Cow<'_, DynamicImage> = match format {
        ImageFormat::Jpeg if !matches!(img, DynamicImage::ImageRgb8(_)) => {
            Cow::Owned(DynamicImage::ImageRgb8(img.to_rgb8()))
        }
        _ => Cow::Borrowed(img),
    };

    let mut buf = Vec::new();
    prepared
        .write_to(&mut Cursor::new(&mut buf), format.to_image_crate())
        .map_err(|e| DocPipeError::ImageEncode {
            page,
            detail: e.to_string(),
        })?;

    debug!("Encoded page {} → {} bytes {}", page, buf.len(), format);
    Ok(buf)
}

/// Encode every page in order.
pub fn encode_pages(pages: &[DynamicImage], format: ImageFormat) -> Result<Vec<Vec<u8>>, DocPipeError> {
    pages
        .iter()
        .enumerate()
        .map(|(i, img)| encode_page(img, format, i + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn translucent() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, image::Rgba([255, 0, 0, 128])))
    }

    #[test]
    fn png_keeps_alpha() {
        let bytes = encode_page(&translucent(), ImageFormat::Png, 1).unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));
        let back = image::load_from_memory(&bytes).unwrap();
        assert!(back.color().has_alpha());
    }

    #[test]
    fn jpeg_drops_alpha() {
        let bytes = encode_page(&translucent(), ImageFormat::Jpeg, 1).unwrap();
        assert!(bytes.starts_with(&[0xFF, 0xD8, 0xFF]));
        let back = image::load_from_memory(&bytes).unwrap();
        assert!(!back.color().has_alpha());
    }

    #[test]
    fn every_format_encodes() {
        for fmt in [
            ImageFormat::Png,
            ImageFormat::Jpeg,
            ImageFormat::Webp,
            ImageFormat::Tiff,
            ImageFormat::Bmp,
        ] {
            let out = encode_pages(&[translucent(), translucent()], fmt).unwrap();
            assert_eq!(out.len(), 2, "{fmt}");
            assert!(out.iter().all(|b| !b.is_empty()), "{fmt}");
        }
    }
}
