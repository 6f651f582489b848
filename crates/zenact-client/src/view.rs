//! Read-time merge of the polled task and the live push-channel state.
//!
//! Nothing here holds state. Both inputs stay owned by their components and
//! the view borrows from them, so every field can be traced to its source.

use zenact_types::{Step, Task, TaskStatus};

use crate::live_state::{LiveState, TerminalOutcome};
use crate::session::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSource {
    Live,
    Polled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskView<'a> {
    pub task_id: &'a str,
    pub prompt: &'a str,
    pub status: TaskStatus,
    pub steps: &'a [Step],
    pub step_source: StepSource,
    pub screenshot: Option<&'a str>,
    pub latest_url: Option<&'a str>,
    pub completion_message: Option<&'a str>,
    pub failure: Option<&'a str>,
    pub live_connected: bool,
}

impl TaskView<'_> {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Combine `task` with `live`. Live data only counts when it belongs to the
/// same task.
///
/// Live steps win whenever there are any, even after the push channel gave up
/// and polling has since seen more. Polled steps show only while the channel
/// has produced none.
pub fn merge_view<'a>(task: &'a Task, live: &'a LiveState) -> TaskView<'a> {
    let live = (live.task_id() == Some(task.id.as_str())).then_some(live);

    let (steps, step_source, last_step) = match live {
        Some(live) if !live.steps().is_empty() => {
            (live.steps(), StepSource::Live, live.steps().last())
        }
        _ => (task.steps.as_slice(), StepSource::Polled, task.last_step()),
    };

    let outcome = live.and_then(LiveState::outcome);
    let status = match outcome {
        Some(TerminalOutcome::Completed { .. }) => TaskStatus::Completed,
        Some(TerminalOutcome::Failed { .. }) => TaskStatus::Failed,
        None => task.status,
    };

    let failure = match outcome {
        Some(TerminalOutcome::Failed { error }) => Some(error.as_str()),
        Some(TerminalOutcome::Completed { .. }) => None,
        None if task.status == TaskStatus::Failed => task.error.as_deref(),
        None => None,
    };

    TaskView {
        task_id: &task.id,
        prompt: &task.prompt,
        status,
        steps,
        step_source,
        screenshot: live.and_then(LiveState::screenshot),
        latest_url: last_step
            .map(|s| s.url.as_str())
            .filter(|url| !url.is_empty()),
        completion_message: live.and_then(LiveState::completion_message),
        failure,
        live_connected: live.is_some_and(LiveState::is_connected),
    }
}

/// Text for the error banner: the controller's own error first, then a failure
/// reported over the push channel.
pub fn user_error<'a>(session: &'a SessionSnapshot, live: &'a LiveState) -> Option<&'a str> {
    if let Some(error) = session.error.as_deref() {
        return Some(error);
    }
    let task_id = session.task.as_ref().map(|t| t.id.as_str())?;
    if live.task_id() != Some(task_id) {
        return None;
    }
    live.failure_error()
}
