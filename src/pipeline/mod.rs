//! Pipeline stages for document conversion.
//!
//! Each submodule implements one backend or one transformation step, so
//! each can be tested on its own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─▶ pdf ────────────────┐
//! input ─────┼─▶ office ─▶ pdf ──────┼─▶ raster ─▶ assemble ─▶ encode
//! (spill)    ├─▶ html ───▶ pdf ──────┤  (bg, cap)  (result)
//!            └─▶ image ──────────────┘
//! ```
//!
//! 1. [`input`]   : the caller's bytes or path, spilled to a temp workspace
//!    when an external tool needs a file
//! 2. [`pdf`]     : pdfium rendering and PDF assembly; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`office`] / [`html`] : external converters, driven by [`command`]
//! 4. [`image`]   : single raster inputs
//! 5. [`raster`]  : background compositing and the max-side cap
//! 6. [`assemble`] / [`encode`] : shape pages into the requested result

pub mod assemble;
pub mod command;
pub mod encode;
pub mod engine;
pub mod html;
pub mod image;
pub mod input;
pub mod office;
pub mod pdf;
pub mod raster;
