//! Name-keyed table of [`TaskHandler`]s.
//!
//! Built once at startup and shared read-only behind an `Arc`.

use crate::error::DocPipeError;
use crate::task::handler::{TaskContext, TaskHandler};
use crate::task::handlers::{DocConvertHandler, OcrEngine, ToPdfHandler, VlmOcrHandler};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

fn normalise(name: &str) -> String {
    name.trim().to_lowercase()
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in handlers: `doc_convert` and `to_pdf`, plus `vlm_ocr`
    /// when an OCR engine is supplied.
    pub fn with_defaults(ocr: Option<Arc<dyn OcrEngine>>) -> Result<Self, DocPipeError> {
        let mut registry = Self::new();
        registry.register(Arc::new(DocConvertHandler))?;
        registry.register(Arc::new(ToPdfHandler))?;
        if let Some(engine) = ocr {
            registry.register(Arc::new(VlmOcrHandler::new(engine)))?;
        }
        Ok(registry)
    }

    /// Add `handler` under its normalised name.
    ///
    /// # Errors
    /// - [`DocPipeError::InvalidConfig`] for a blank name
    /// - [`DocPipeError::HandlerAlreadyRegistered`] for a duplicate
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) -> Result<(), DocPipeError> {
        let key = normalise(handler.name());
        if key.is_empty() {
            return Err(DocPipeError::InvalidConfig(
                "task handler must define a non-empty name".to_string(),
            ));
        }
        if self.handlers.contains_key(&key) {
            return Err(DocPipeError::HandlerAlreadyRegistered(key));
        }
        debug!("Registered task handler '{}'", key);
        self.handlers.insert(key, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(&normalise(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the handler named by `ctx.run.name`. Handler errors propagate
    /// unchanged.
    pub async fn dispatch(&self, ctx: &TaskContext<'_>, data: &[u8]) -> Result<(), DocPipeError> {
        let key = normalise(&ctx.run.name);
        let handler = self
            .handlers
            .get(&key)
            .ok_or_else(|| DocPipeError::UnknownTask(key.clone()))?;
        info!("Dispatching run {} to '{}' ({} bytes)", ctx.run.id, key, data.len());
        handler.run(ctx, data).await
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
