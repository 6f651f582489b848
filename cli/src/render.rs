use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::Engine;
use tracing::{debug, warn};
use zenact_client::TaskView;
use zenact_types::{Action, ActionType, TaskStatus};

pub fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "Pending",
        TaskStatus::Running => "Running",
        TaskStatus::Completed => "Completed",
        TaskStatus::Failed => "Failed",
    }
}

pub fn format_action_label(action: &Action) -> String {
    match action.kind {
        ActionType::Navigate => format!("Navigate to {}", action.value),
        ActionType::Click => format!("Click {}", action.selector),
        ActionType::Type => format!("Type \"{}\" into {}", action.value, action.selector),
        ActionType::Scroll => {
            let direction = if action.value.is_empty() {
                "down"
            } else {
                action.value.as_str()
            };
            format!("Scroll {direction}")
        }
        ActionType::Wait => "Wait for page".to_string(),
        ActionType::Done => "Task complete".to_string(),
        ActionType::Hold if action.value.is_empty() => format!("Hold {}", action.selector),
        ActionType::Hold => format!("Hold {} for {}ms", action.selector, action.value),
        ActionType::Drag => format!("Drag {} to {}", action.selector, action.value),
        ActionType::Unknown => action.kind.as_str().to_string(),
    }
}

/// Turns successive views of one task into timeline lines, printing each
/// iteration and each status or connection change once.
#[derive(Debug, Default)]
pub struct TimelinePrinter {
    printed: HashSet<u32>,
    status: Option<TaskStatus>,
    connected: Option<bool>,
    finished: bool,
}

impl TimelinePrinter {
    pub fn observe(&mut self, view: &TaskView<'_>) -> Vec<String> {
        let mut lines = Vec::new();

        if self.connected != Some(view.live_connected) {
            if view.live_connected || self.connected.is_some() {
                lines.push(format!(
                    "live: {}",
                    if view.live_connected {
                        "connected"
                    } else {
                        "disconnected"
                    }
                ));
            }
            self.connected = Some(view.live_connected);
        }

        if self.status != Some(view.status) {
            lines.push(format!("status: {}", status_label(view.status)));
            self.status = Some(view.status);
        }

        for step in view.steps {
            if !self.printed.insert(step.iteration) {
                continue;
            }
            let label = format_action_label(&step.action);
            if step.thought.is_empty() {
                lines.push(format!("#{} {label}", step.iteration));
            } else {
                lines.push(format!("#{} {label} — {}", step.iteration, step.thought));
            }
        }

        if view.is_terminal() && !self.finished {
            self.finished = true;
            match view.status {
                TaskStatus::Completed => lines.push(format!(
                    "completed: {}",
                    view.completion_message.unwrap_or("Task completed")
                )),
                _ => lines.push(format!(
                    "failed: {}",
                    view.failure.unwrap_or("Task failed")
                )),
            }
        }

        lines
    }
}

/// Decode a base64 PNG and write it as `<dir>/<task_id>.png`.
pub fn write_screenshot(dir: &Path, task_id: &str, encoded: &str) -> anyhow::Result<PathBuf> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .context("screenshot is not valid base64")?;
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let file_name: String = task_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let path = dir.join(format!("{file_name}.png"));
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Writes the latest screenshot of a run, once per distinct payload. A payload
/// that cannot be written is logged and skipped so the run keeps going.
#[derive(Debug)]
pub struct ScreenshotSaver {
    dir: PathBuf,
    last: Option<String>,
}

impl ScreenshotSaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last: None,
        }
    }

    pub fn save(&mut self, task_id: &str, encoded: &str) -> Option<PathBuf> {
        if self.last.as_deref() == Some(encoded) {
            return None;
        }
        self.last = Some(encoded.to_string());
        match write_screenshot(&self.dir, task_id, encoded) {
            Ok(path) => {
                debug!("screenshot written to {}", path.display());
                Some(path)
            }
            Err(err) => {
                warn!(task_id, error = %format!("{err:#}"), "skipping screenshot");
                None
            }
        }
    }
}
