//! The task run record and its lifecycle.
//!
//! ```text
//! Pending ──▶ Running ──┬─▶ Succeeded
//!    │                  └─▶ Failed
//!    └──────────────────────▶ Failed   (target file gone)
//! ```
//!
//! Terminal states accept no further transitions. `mark_running` on a run
//! that is already Running is a no-op so that a redelivered trigger can
//! re-drive a run interrupted by a crash; the original start time is kept.

use crate::error::DocPipeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a [`TaskRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        })
    }
}

/// One execution of a named task against one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: String,
    pub file_id: String,
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskRun {
    /// A fresh Pending run with a random id.
    pub fn new(file_id: impl Into<String>, name: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_id: file_id.into(),
            name: name.into(),
            params,
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Pending → Running. Already Running is accepted unchanged.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> Result<(), DocPipeError> {
        match self.status {
            TaskStatus::Pending | TaskStatus::Running => {
                self.status = TaskStatus::Running;
                self.started_at.get_or_insert(now);
                Ok(())
            }
            from => Err(self.invalid(from, TaskStatus::Running)),
        }
    }

    /// Running → Succeeded.
    pub fn mark_succeeded(&mut self, now: DateTime<Utc>) -> Result<(), DocPipeError> {
        match self.status {
            TaskStatus::Running => {
                self.status = TaskStatus::Succeeded;
                self.finished_at = Some(now);
                self.error = None;
                Ok(())
            }
            from => Err(self.invalid(from, TaskStatus::Succeeded)),
        }
    }

    /// Pending or Running → Failed, recording `error`.
    pub fn mark_failed(&mut self, now: DateTime<Utc>, error: impl Into<String>) -> Result<(), DocPipeError> {
        match self.status {
            TaskStatus::Pending | TaskStatus::Running => {
                self.status = TaskStatus::Failed;
                self.started_at.get_or_insert(now);
                self.finished_at = Some(now);
                self.error = Some(error.into());
                Ok(())
            }
            from => Err(self.invalid(from, TaskStatus::Failed)),
        }
    }

    fn invalid(&self, from: TaskStatus, to: TaskStatus) -> DocPipeError {
        DocPipeError::InvalidTransition {
            run_id: self.id.clone(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    // ── Parameters ───────────────────────────────────────────────────────

    /// A string parameter; numbers are rendered as text.
    pub fn param_str(&self, key: &str) -> Option<String> {
        match self.params.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// A positive integer parameter, given as a JSON number or a numeric
    /// string. `null` counts as absent.
    pub fn param_u32(&self, key: &str) -> Result<Option<u32>, DocPipeError> {
        let bad = |v: &Value| DocPipeError::InvalidParams(format!("{key} must be a positive integer, got {v}"));
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v @ Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| bad(v)),
            Some(v @ Value::String(s)) => u32::from_str(s.trim()).map(Some).map_err(|_| bad(v)),
            Some(v) => Err(bad(v)),
        }
    }
}
