//! Shared page post-processing: background flattening and size capping.
//!
//! Both the PDF rasteriser and the image loader finish each page the same
//! way, so the rules live here once.

use crate::config::Rgba;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

/// Composite `img` over an opaque-or-not `background` and drop alpha.
///
/// The result is RGB8: once flattened there is no transparency left to keep.
pub fn flatten(img: DynamicImage, background: Rgba) -> DynamicImage {
    let top = img.into_rgba8();
    let mut base = RgbaImage::from_pixel(top.width(), top.height(), image::Rgba(background.0));
    imageops::overlay(&mut base, &top, 0, 0);
    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(base).into_rgb8())
}

/// Downscale so the longest side is at most `max_side`, preserving aspect.
///
/// Each dimension becomes `floor(dim * max_side / longest)`, never less than
/// one pixel. Images already within bounds are returned untouched.
pub fn fit_max_side(img: DynamicImage, max_side: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    let longest = w.max(h);
    if max_side == 0 || longest <= max_side {
        return img;
    }
    let (nw, nh) = scaled_dims(w, h, max_side);
    img.resize_exact(nw, nh, FilterType::Lanczos3)
}

/// Target dimensions for [`fit_max_side`].
pub fn scaled_dims(w: u32, h: u32, max_side: u32) -> (u32, u32) {
    let ratio = f64::from(max_side) / f64::from(w.max(h));
    let scale = |d: u32| ((f64::from(d) * ratio).floor() as u32).max(1);
    (scale(w), scale(h))
}

/// Apply the optional background and size cap, in that order.
pub fn finish_page(img: DynamicImage, background: Option<Rgba>, max_side: Option<u32>) -> DynamicImage {
    let img = match background {
        Some(bg) => flatten(img, bg),
        None => img,
    };
    match max_side {
        Some(m) => fit_max_side(img, m),
        None => img,
    }
}
