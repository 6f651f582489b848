//! Wire-format models for the task REST API and the per-task push channel.
//!
//! | Action        | Path                      |
//! |---------------|---------------------------|
//! | Create task   | `POST /api/task`          |
//! | Get task      | `GET  /api/task/{id}`     |
//! | Push channel  | `GET  /api/task/{id}/ws`  |
//! | Health        | `GET  /health`            |

use serde::{Deserialize, Serialize};
use zenact_types::Step;

pub const DEFAULT_COMPLETION_MESSAGE: &str = "Task completed";
pub const DEFAULT_FAILURE_MESSAGE: &str = "Task failed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTaskRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTaskResponse {
    pub task_id: String,
    #[serde(default)]
    pub status: String,
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: String,
}

/// A frame received on the push channel, discriminated by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Screenshot {
        #[serde(default)]
        task_id: String,
        #[serde(default)]
        screenshot: String,
    },
    StepComplete {
        #[serde(default)]
        task_id: String,
        step: Step,
    },
    TaskComplete {
        #[serde(default)]
        task_id: String,
        #[serde(default)]
        message: Option<String>,
    },
    TaskFailed {
        #[serde(default)]
        task_id: String,
        #[serde(default)]
        error: Option<String>,
    },
}

impl LiveEvent {
    pub fn task_id(&self) -> &str {
        match self {
            LiveEvent::Screenshot { task_id, .. }
            | LiveEvent::StepComplete { task_id, .. }
            | LiveEvent::TaskComplete { task_id, .. }
            | LiveEvent::TaskFailed { task_id, .. } => task_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::Screenshot { .. } => "screenshot",
            LiveEvent::StepComplete { .. } => "step_complete",
            LiveEvent::TaskComplete { .. } => "task_complete",
            LiveEvent::TaskFailed { .. } => "task_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LiveEvent::TaskComplete { .. } | LiveEvent::TaskFailed { .. }
        )
    }
}

/// Parse one text frame. Unknown `type` values and missing required fields
/// are errors; the caller decides whether to drop the frame.
pub fn parse_live_frame(text: &str) -> Result<LiveEvent, serde_json::Error> {
    serde_json::from_str(text)
}

/// Message text for a terminal event, falling back to the generic wording when
/// the backend left it out.
pub fn outcome_text(value: Option<&str>, fallback: &str) -> String {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => fallback.to_string(),
    }
}
