//! Asynchronous task execution.
//!
//! ```text
//! Submitter ──TaskTrigger──▶ queue ──▶ Worker::serve
//!                                          │
//!                       load run + file ◀──┘
//!                       resolve source bytes
//!                       TaskRegistry::dispatch ──▶ TaskHandler::run
//!                       commit terminal state
//! ```

pub mod handler;
pub mod handlers;
pub mod registry;
pub mod run;
pub mod submit;
pub mod worker;

pub use handler::{TaskContext, TaskHandler};
pub use registry::TaskRegistry;
pub use run::{TaskRun, TaskStatus};
pub use submit::Submitter;
pub use worker::{RunOutcome, Worker};

use serde::{Deserialize, Serialize};

/// The message that asks a worker to execute one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTrigger {
    pub task_name: String,
    pub task_run_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_wire_shape() {
        let t = TaskTrigger {
            task_name: "to_pdf".into(),
            task_run_id: "r1".into(),
        };
        assert_eq!(
            serde_json::to_value(&t).unwrap(),
            serde_json::json!({"task_name": "to_pdf", "task_run_id": "r1"})
        );
    }
}
