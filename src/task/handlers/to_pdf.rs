//! `to_pdf`: normalise the source to a PDF and store it.

use crate::error::DocPipeError;
use crate::pipeline::input::SourceDocument;
use crate::records::Artifact;
use crate::task::handler::{TaskContext, TaskHandler};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

pub const NAME: &str = "to_pdf";
pub const ARTIFACT_KIND: &str = "pdf";

#[derive(Debug, Clone, Copy, Default)]
pub struct ToPdfHandler;

/// Convert `data` to PDF, store it under `to-pdf/{stem}.pdf` and record the
/// artifact. Returns the PDF bytes.
pub async fn convert_and_store(ctx: &TaskContext<'_>, data: &[u8]) -> Result<Vec<u8>, DocPipeError> {
    let dpi = ctx.run.param_u32("dpi")?.unwrap_or(crate::config::DEFAULT_DPI);
    let pdf = ctx
        .converter
        .to_pdf_bytes(SourceDocument::Bytes(data.to_vec()), dpi)
        .await?;

    let key = ctx.artifact_key(&format!("to-pdf/{}.pdf", ctx.file.stem()));
    let uri = ctx.objects.put(&key, pdf.clone(), "application/pdf").await?;
    ctx.records
        .insert_artifact(Artifact::new(
            &ctx.file.id,
            &ctx.run.id,
            ARTIFACT_KIND,
            &uri,
            json!({ "source": NAME }),
        ))
        .await?;

    info!("Run {}: stored {} byte PDF at {}", ctx.run.id, pdf.len(), uri);
    Ok(pdf)
}

#[async_trait]
impl TaskHandler for ToPdfHandler {
    fn name(&self) -> &str {
        NAME
    }

    async fn run(&self, ctx: &TaskContext<'_>, data: &[u8]) -> Result<(), DocPipeError> {
        convert_and_store(ctx, data).await.map(|_| ())
    }
}
