//! `vlm_ocr`: run a vision-language OCR engine over the document and upload
//! everything it produced.
//!
//! The engine itself is an injected [`OcrEngine`]; this handler owns the
//! surrounding plumbing:
//!
//! 1. make sure the input is a PDF (non-PDF sources go through the
//!    converter's PDF path)
//! 2. give the engine a private `vlm-` scratch directory with `extract/` and
//!    `images/` subdirectories
//! 3. upload both trees as-is under `vlm/extract/…` and `vlm/images/…`
//! 4. record one manifest artifact per tree, plus the layout PDF if drawn

use crate::error::DocPipeError;
use crate::pipeline::input::SourceDocument;
use crate::records::Artifact;
use crate::storage::URI_SCHEME;
use crate::task::handler::{TaskContext, TaskHandler};
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const NAME: &str = "vlm_ocr";

/// Where the engine writes its outputs.
#[derive(Debug, Clone)]
pub struct OcrOutputDirs {
    /// Markdown, JSON and other text outputs.
    pub extract: PathBuf,
    /// Cropped figures referenced from the Markdown.
    pub images: PathBuf,
}

/// A document OCR / layout-analysis engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Analyse `pdf`, writing outputs named after `stem` into `out`.
    ///
    /// Returns the file name, relative to `out.extract`, of a layout PDF
    /// when the engine drew one.
    async fn analyze(
        &self,
        pdf: &[u8],
        stem: &str,
        out: &OcrOutputDirs,
    ) -> Result<Option<String>, DocPipeError>;
}

pub struct VlmOcrHandler {
    engine: Arc<dyn OcrEngine>,
}

impl VlmOcrHandler {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for VlmOcrHandler {
    fn name(&self) -> &str {
        NAME
    }

    async fn run(&self, ctx: &TaskContext<'_>, data: &[u8]) -> Result<(), DocPipeError> {
        let pdf = if data.len() > 4 && data.starts_with(b"%PDF") {
            data.to_vec()
        } else {
            ctx.converter
                .to_pdf_bytes(SourceDocument::Bytes(data.to_vec()), crate::config::DEFAULT_DPI)
                .await
                .map_err(|e| DocPipeError::Internal(format!("to-pdf failed: {e}")))?
        };
        let stem = ctx.file.stem().to_string();

        let scratch = tempfile::Builder::new()
            .prefix("vlm-")
            .tempdir()
            .map_err(|e| DocPipeError::Internal(format!("tempdir: {e}")))?;
        let dirs = OcrOutputDirs {
            extract: scratch.path().join("extract"),
            images: scratch.path().join("images"),
        };
        for dir in [&dirs.extract, &dirs.images] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| DocPipeError::io(dir, e))?;
        }

        let layout = self.engine.analyze(&pdf, &stem, &dirs).await?;
        let origin = dirs.extract.join(format!("{stem}_origin.bin"));
        tokio::fs::write(&origin, &pdf)
            .await
            .map_err(|e| DocPipeError::io(&origin, e))?;

        let extract_prefix = ctx.artifact_key("vlm/extract");
        let images_prefix = ctx.artifact_key("vlm/images");
        let extract_files = upload_tree(ctx, &dirs.extract, &extract_prefix).await?;
        let image_files = upload_tree(ctx, &dirs.images, &images_prefix).await?;

        let layout_uri = match layout {
            Some(name) if dirs.extract.join(&name).is_file() => {
                let path = dirs.extract.join(&name);
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| DocPipeError::io(&path, e))?;
                let key = format!("{extract_prefix}/{name}");
                Some((ctx.objects.put(&key, bytes, "application/pdf").await?, name))
            }
            Some(name) => {
                warn!("OCR engine reported layout PDF {} but did not write it", name);
                None
            }
            None => None,
        };

        let bucket = ctx.objects.bucket();
        ctx.records
            .insert_artifact(Artifact::new(
                &ctx.file.id,
                &ctx.run.id,
                "vlm_md_manifest",
                format!("{URI_SCHEME}{bucket}/{extract_prefix}/"),
                json!({ "files": extract_files }),
            ))
            .await?;
        ctx.records
            .insert_artifact(Artifact::new(
                &ctx.file.id,
                &ctx.run.id,
                "vlm_images_manifest",
                format!("{URI_SCHEME}{bucket}/{images_prefix}/"),
                json!({ "files": image_files }),
            ))
            .await?;
        if let Some((uri, name)) = layout_uri {
            ctx.records
                .insert_artifact(Artifact::new(
                    &ctx.file.id,
                    &ctx.run.id,
                    "vlm_layout_pdf",
                    uri,
                    json!({ "filename": name }),
                ))
                .await?;
        }

        info!(
            "Run {}: uploaded {} extract file(s) and {} image(s)",
            ctx.run.id,
            extract_files.len(),
            image_files.len()
        );
        Ok(())
    }
}

/// Upload every file below `dir` to `{prefix}/{relative path}`, returning
/// the relative paths (with `/` separators) in sorted order.
async fn upload_tree(ctx: &TaskContext<'_>, dir: &Path, prefix: &str) -> Result<Vec<String>, DocPipeError> {
    let root = dir.to_path_buf();
    let files = tokio::task::spawn_blocking(move || list_files(&root))
        .await
        .map_err(|e| DocPipeError::Internal(format!("Directory walk task panicked: {}", e)))??;

    let mut uploaded = Vec::with_capacity(files.len());
    for (rel, path) in files {
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| DocPipeError::io(&path, e))?;
        let content_type = mime_guess::from_path(&path)
            .first_raw()
            .unwrap_or(crate::detect::OCTET_STREAM);
        ctx.objects
            .put(&format!("{prefix}/{rel}"), bytes, content_type)
            .await?;
        debug!("Uploaded {}/{}", prefix, rel);
        uploaded.push(rel);
    }
    Ok(uploaded)
}

fn list_files(root: &Path) -> Result<Vec<(String, PathBuf)>, DocPipeError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| DocPipeError::Internal(format!("walk {}: {e}", root.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| DocPipeError::Internal(e.to_string()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((rel, entry.into_path()));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_files_is_sorted_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.md"), "b").unwrap();
        std::fs::write(dir.path().join("a.json"), "a").unwrap();
        std::fs::write(dir.path().join("sub/c.png"), "c").unwrap();

        let rels: Vec<String> = list_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|(rel, _)| rel)
            .collect();
        assert_eq!(rels, vec!["a.json", "b.md", "sub/c.png"]);
    }

    #[test]
    fn empty_tree_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_files(dir.path()).unwrap().is_empty());
    }
}
