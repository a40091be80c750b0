//! # edgequake-docpipe
//!
//! Turn arbitrary documents into page images or a normalised PDF, and run
//! those conversions as tracked, asynchronous tasks.
//!
//! ## Why this crate?
//!
//! Documents arrive as PDFs, Office files, HTML pages and bare images, often
//! as an anonymous byte blob. This crate classifies the blob, picks the
//! cheapest conversion that preserves the most content (a PDF stays a PDF, an
//! Office file goes through LibreOffice instead of being rasterised), and
//! shapes the result the way the caller asked for it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes / path
//!  │
//!  ├─ 1. Detect    content sniffing, then extension, then magic numbers
//!  ├─ 2. Route     PDF → Office → HTML → Image → fallback
//!  ├─ 3. Convert   pdfium / soffice / headless browser / image decoder
//!  ├─ 4. Raster    background compositing, max-side cap
//!  └─ 5. Assemble  pages, encoded bytes, files, ZIP or PDF
//! ```
//!
//! On top of that, [`task`] runs named handlers (`doc_convert`, `to_pdf`,
//! `vlm_ocr`) against stored files, tracking each run from Pending to
//! Succeeded or Failed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docpipe::{convert, ConversionOptions, ConversionResult, ReturnMode};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConversionOptions::builder()
//!         .dpi(150)
//!         .return_mode(ReturnMode::Files)
//!         .output_dir("pages")
//!         .build()?;
//!     if let ConversionResult::Files(paths) = convert(Path::new("deck.pptx"), &options).await? {
//!         eprintln!("wrote {} page(s)", paths.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docpipe` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docpipe = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime Requirements
//!
//! | Input        | Needs                                            |
//! |--------------|--------------------------------------------------|
//! | PDF          | pdfium shared library (`PDFIUM_LIB_PATH`)        |
//! | Office       | `soffice` or `libreoffice` on `PATH`, plus pdfium |
//! | HTML         | an [`HtmlRenderer`] or Chrome/Chromium, plus pdfium |
//! | Images       | nothing                                          |
//!
//! A PDF requested as a PDF never touches pdfium.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod detect;
pub mod error;
pub mod pipeline;
pub mod records;
pub mod resolve;
pub mod route;
pub mod storage;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionOptions, ConversionOptionsBuilder, ImageFormat, ReturnMode, Rgba, ServiceConfig};
pub use convert::{convert, convert_sync, ConversionPlan, Converter};
pub use detect::{classify, DetectedType, DetectionSource};
pub use error::{DocPipeError, SourceAttempt};
pub use pipeline::assemble::{ConversionResult, ResultSummary};
pub use pipeline::html::HtmlRenderer;
pub use pipeline::input::SourceDocument;
pub use records::{Artifact, FileRecord, FileStatus, MemoryRecordStore, RecordStore};
pub use route::{route, Family, Route};
pub use storage::{LocalObjectStore, MemoryObjectStore, ObjectStore, StorageUri};
pub use task::{RunOutcome, Submitter, TaskContext, TaskHandler, TaskRegistry, TaskRun, TaskStatus, TaskTrigger, Worker};
