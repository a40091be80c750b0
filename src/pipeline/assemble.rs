//! Output assembly: rendered pages → the caller's requested result shape.
//!
//! | Mode      | Result                                                    |
//! |-----------|-----------------------------------------------------------|
//! | `Pages`   | the rasters themselves                                    |
//! | `Bytes`   | one encoded image per page                                |
//! | `Files`   | `{prefix}_{i:04}.{fmt}` under the output dir, absolute    |
//! | `Archive` | deflated ZIP of the encoded pages                         |
//! | `Pdf`     | one PDF page per raster, sized `px / dpi * 72` points     |
//!
//! Page numbers in generated names are 1-based and zero-padded to four
//! digits so that lexical order equals page order.

use crate::config::{ConversionOptions, ImageFormat, ReturnMode};
use crate::error::DocPipeError;
use crate::pipeline::{encode, pdf};
use image::DynamicImage;
use serde::Serialize;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// The outcome of a conversion, shaped by [`ReturnMode`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionResult {
    Pages(Vec<DynamicImage>),
    Bytes(Vec<Vec<u8>>),
    Files(Vec<PathBuf>),
    Archive(Vec<u8>),
    Pdf(Vec<u8>),
}

impl ConversionResult {
    /// The mode this result answers.
    pub fn mode(&self) -> ReturnMode {
        match self {
            ConversionResult::Pages(_) => ReturnMode::Pages,
            ConversionResult::Bytes(_) => ReturnMode::Bytes,
            ConversionResult::Files(_) => ReturnMode::Files,
            ConversionResult::Archive(_) => ReturnMode::Archive,
            ConversionResult::Pdf(_) => ReturnMode::Pdf,
        }
    }

    /// A JSON-friendly summary, without payload bytes.
    pub fn summary(&self) -> ResultSummary {
        let (items, bytes, files) = match self {
            ConversionResult::Pages(p) => (p.len(), 0, Vec::new()),
            ConversionResult::Bytes(b) => (b.len(), b.iter().map(Vec::len).sum(), Vec::new()),
            ConversionResult::Files(f) => (f.len(), 0, f.clone()),
            ConversionResult::Archive(a) | ConversionResult::Pdf(a) => (1, a.len(), Vec::new()),
        };
        ResultSummary {
            mode: self.mode(),
            items,
            bytes,
            files,
        }
    }
}

/// Serializable overview of a [`ConversionResult`].
#[derive(Debug, Clone, Serialize)]
pub struct ResultSummary {
    pub mode: ReturnMode,
    pub items: usize,
    pub bytes: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathBuf>,
}

/// Shape `pages` per `options.return_mode`.
///
/// When `options.save` is set, pages are also written to the output
/// directory first; FILES mode then returns those same paths.
pub async fn assemble(
    pages: Vec<DynamicImage>,
    options: &ConversionOptions,
) -> Result<ConversionResult, DocPipeError> {
    if pages.is_empty() {
        return Err(DocPipeError::NoPages);
    }

    let saved = if options.save {
        Some(save_pages(&pages, options).await?)
    } else {
        None
    };

    let result = match options.return_mode {
        ReturnMode::Pages => ConversionResult::Pages(pages),
        ReturnMode::Bytes => ConversionResult::Bytes(encode::encode_pages(&pages, options.image_format)?),
        ReturnMode::Files => match saved {
            Some(paths) => ConversionResult::Files(paths),
            None => ConversionResult::Files(save_pages(&pages, options).await?),
        },
        ReturnMode::Archive => {
            let encoded = encode::encode_pages(&pages, options.image_format)?;
            let entries = encoded.into_iter().enumerate().map(|(i, bytes)| {
                let name = archive_entry_name(
                    options.archive_entry_name_hint.as_deref(),
                    &options.filename_prefix,
                    i + 1,
                    options.image_format,
                );
                (name, bytes)
            });
            ConversionResult::Archive(build_archive(entries)?)
        }
        ReturnMode::Pdf => ConversionResult::Pdf(pdf::images_to_pdf(pages, options.dpi).await?),
    };

    debug!("Assembled {:?} result", options.return_mode);
    Ok(result)
}

/// Encode and write every page under the output directory.
///
/// Returns absolute paths in page order.
pub async fn save_pages(
    pages: &[DynamicImage],
    options: &ConversionOptions,
) -> Result<Vec<PathBuf>, DocPipeError> {
    let dir = options.resolved_output_dir();
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| DocPipeError::io(&dir, e))?;
    let dir = std::path::absolute(&dir).map_err(|e| DocPipeError::io(&dir, e))?;

    let mut paths = Vec::with_capacity(pages.len());
    for (i, img) in pages.iter().enumerate() {
        let bytes = encode::encode_page(img, options.image_format, i + 1)?;
        let path = dir.join(page_file_name(&options.filename_prefix, i + 1, options.image_format));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| DocPipeError::io(&path, e))?;
        paths.push(path);
    }

    info!("Saved {} page(s) to {}", paths.len(), dir.display());
    Ok(paths)
}

/// `{prefix}_{index:04}.{fmt}`, index 1-based.
pub fn page_file_name(prefix: &str, index: usize, format: ImageFormat) -> String {
    format!("{prefix}_{index:04}.{}", format.extension())
}

/// Archive entry name for page `index` (1-based).
///
/// With a hint `report.png` this is `report_0001.png`; a hint without an
/// extension borrows the format's (`report_0001.png` for `report`). Without
/// a hint it is the page file name.
pub fn archive_entry_name(
    hint: Option<&str>,
    prefix: &str,
    index: usize,
    format: ImageFormat,
) -> String {
    match hint {
        Some(hint) => {
            let (root, ext) = split_ext(hint);
            if ext.is_empty() {
                format!("{root}_{index:04}.{}", format.extension())
            } else {
                format!("{root}_{index:04}{ext}")
            }
        }
        None => page_file_name(prefix, index, format),
    }
}

/// Split `name` into root and extension (with dot) at the last dot of the
/// final path component. Leading dots do not start an extension.
pub fn split_ext(name: &str) -> (&str, &str) {
    let base_start = name.rfind(['/', '\\']).map_or(0, |i| i + 1);
    let base = &name[base_start..];
    let leading = base.len() - base.trim_start_matches('.').len();
    match base[leading..].rfind('.') {
        Some(dot) => name.split_at(base_start + leading + dot),
        None => (name, ""),
    }
}

/// Write `(entry name, bytes)` pairs into an in-memory deflated ZIP.
pub fn build_archive<I>(entries: I) -> Result<Vec<u8>, DocPipeError>
where
    I: IntoIterator<Item = (String, Vec<u8>)>,
{
    let archive_err = |e: zip::result::ZipError| DocPipeError::Archive(e.to_string());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in entries {
        zip.start_file(name.as_str(), options).map_err(archive_err)?;
        zip.write_all(&bytes)
            .map_err(|e| DocPipeError::Archive(format!("{name}: {e}")))?;
    }

    let cursor = zip.finish().map_err(archive_err)?;
    Ok(cursor.into_inner())
}

/// Stem of a user-visible file name: everything before the last extension.
pub fn file_stem(filename: &str) -> &str {
    split_ext(filename).0
}
