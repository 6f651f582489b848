use std::collections::HashSet;
use std::time::Duration;

use zenact_types::Step;
use zenact_wire::{outcome_text, LiveEvent, DEFAULT_COMPLETION_MESSAGE, DEFAULT_FAILURE_MESSAGE};

/// Where the push channel is in its connect/reconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    /// No task id.
    #[default]
    Idle,
    Connecting,
    Open,
    /// Closed unexpectedly; reconnect attempt `attempt` (1-based) fires after `delay`.
    Waiting { attempt: u32, delay: Duration },
    /// A terminal outcome arrived and the connection was closed on purpose.
    Closed,
    /// Reconnect budget spent; polling is the only source left.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed { message: String },
    Failed { error: String },
}

/// Accumulated state of one push channel. Only the synchronizer writes it.
#[derive(Debug, Clone, Default)]
pub struct LiveState {
    task_id: Option<String>,
    epoch: u64,
    phase: ChannelPhase,
    screenshot: Option<String>,
    steps: Vec<Step>,
    seen: HashSet<u32>,
    outcome: Option<TerminalOutcome>,
}

impl LiveState {
    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn phase(&self) -> ChannelPhase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ChannelPhase::Open
    }

    pub fn screenshot(&self) -> Option<&str> {
        self.screenshot.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn outcome(&self) -> Option<&TerminalOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn completion_message(&self) -> Option<&str> {
        match &self.outcome {
            Some(TerminalOutcome::Completed { message }) => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn failure_error(&self) -> Option<&str> {
        match &self.outcome {
            Some(TerminalOutcome::Failed { error }) => Some(error.as_str()),
            _ => None,
        }
    }

    /// Drop everything accumulated so far and start a new epoch for `task_id`.
    pub(crate) fn reset(&mut self, task_id: Option<&str>) {
        *self = LiveState {
            task_id: task_id.map(str::to_string),
            epoch: self.epoch.wrapping_add(1),
            phase: if task_id.is_some() {
                ChannelPhase::Connecting
            } else {
                ChannelPhase::Idle
            },
            ..LiveState::default()
        };
    }

    pub(crate) fn set_phase(&mut self, phase: ChannelPhase) -> bool {
        if self.phase == phase {
            return false;
        }
        self.phase = phase;
        true
    }

    /// Apply one push-channel event in arrival order. Returns whether anything
    /// visible changed. Events after a terminal outcome are ignored.
    pub fn apply(&mut self, event: LiveEvent) -> bool {
        if self.outcome.is_some() {
            return false;
        }

        match event {
            LiveEvent::Screenshot { screenshot, .. } => {
                if screenshot.is_empty() {
                    return false;
                }
                self.screenshot = Some(screenshot);
                true
            }
            LiveEvent::StepComplete { step, .. } => {
                let mut changed = false;
                if step.has_screenshot() {
                    self.screenshot = Some(step.screenshot.clone());
                    changed = true;
                }
                if self.seen.insert(step.iteration) {
                    self.steps.push(step);
                    changed = true;
                }
                changed
            }
            LiveEvent::TaskComplete { message, .. } => {
                self.outcome = Some(TerminalOutcome::Completed {
                    message: outcome_text(message.as_deref(), DEFAULT_COMPLETION_MESSAGE),
                });
                true
            }
            LiveEvent::TaskFailed { error, .. } => {
                self.outcome = Some(TerminalOutcome::Failed {
                    error: outcome_text(error.as_deref(), DEFAULT_FAILURE_MESSAGE),
                });
                true
            }
        }
    }
}
