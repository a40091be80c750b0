//! `doc_convert`: render every page and store them as one ZIP of images.
//!
//! Parameters: `dpi` (default 220), `image_format` (default PNG),
//! `max_side` (optional).

use crate::config::{ConversionOptions, ImageFormat, ReturnMode};
use crate::error::DocPipeError;
use crate::pipeline::assemble::{self, ConversionResult};
use crate::pipeline::input::SourceDocument;
use crate::records::Artifact;
use crate::task::handler::{TaskContext, TaskHandler};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

pub const NAME: &str = "doc_convert";
pub const DEFAULT_DPI: u32 = 220;
pub const ARTIFACT_KIND: &str = "images_zip";

#[derive(Debug, Clone, Copy, Default)]
pub struct DocConvertHandler;

/// Entry name inside the archive. JPEG pages use the short `jpg` suffix.
pub fn entry_name(index: usize, format: ImageFormat) -> String {
    let ext = match format {
        ImageFormat::Jpeg => "jpg",
        other => other.extension(),
    };
    format!("page_{index:04}.{ext}")
}

#[async_trait]
impl TaskHandler for DocConvertHandler {
    fn name(&self) -> &str {
        NAME
    }

    async fn run(&self, ctx: &TaskContext<'_>, data: &[u8]) -> Result<(), DocPipeError> {
        let run = ctx.run;
        let dpi = run.param_u32("dpi")?.unwrap_or(DEFAULT_DPI);
        let format = match run.param_str("image_format") {
            Some(s) => s
                .parse::<ImageFormat>()
                .map_err(|e| DocPipeError::InvalidParams(e.to_string()))?,
            None => ImageFormat::Png,
        };

        let mut builder = ConversionOptions::builder()
            .dpi(dpi)
            .image_format(format)
            .return_mode(ReturnMode::Bytes);
        if let Some(max_side) = run.param_u32("max_side")? {
            builder = builder.max_side(max_side);
        }
        let options = builder
            .build()
            .map_err(|e| DocPipeError::InvalidParams(e.to_string()))?;

        let pages = match ctx
            .converter
            .convert(SourceDocument::Bytes(data.to_vec()), &options)
            .await?
        {
            ConversionResult::Bytes(pages) => pages,
            other => {
                return Err(DocPipeError::Internal(format!(
                    "expected encoded pages, got {} output",
                    other.mode()
                )))
            }
        };
        if pages.is_empty() {
            return Err(DocPipeError::NoPages);
        }
        let page_count = pages.len();

        let archive = assemble::build_archive(
            pages
                .into_iter()
                .enumerate()
                .map(|(i, bytes)| (entry_name(i + 1, format), bytes)),
        )?;

        let key = ctx.artifact_key(&format!("zip/{}.images.zip", ctx.file.stem()));
        let uri = ctx.objects.put(&key, archive, "application/zip").await?;
        ctx.records
            .insert_artifact(Artifact::new(
                &ctx.file.id,
                &run.id,
                ARTIFACT_KIND,
                &uri,
                json!({ "pages": page_count, "format": format.name() }),
            ))
            .await?;

        info!("Run {}: {} page(s) zipped to {}", run.id, page_count, uri);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names_use_jpg_for_jpeg() {
        assert_eq!(entry_name(1, ImageFormat::Jpeg), "page_0001.jpg");
        assert_eq!(entry_name(12, ImageFormat::Png), "page_0012.png");
        assert_eq!(entry_name(3, ImageFormat::Tiff), "page_0003.tiff");
    }
}
