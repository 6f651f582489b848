//! Task Session Controller.
//!
//! Owns the task being watched: submits prompts, polls the backend on a fixed
//! interval until the task reaches a terminal status, and resets on demand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn, Level};
use zenact_observability::{emit_event, redact_text, ChannelKind, ObservabilityEvent};
use zenact_types::Task;

use crate::api::TaskBackend;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::sanitize::{sanitize_prompt, PromptBounds};

/// What the controller currently shows.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub task: Option<Task>,
    pub is_creating: bool,
    pub error: Option<String>,
}

pub struct TaskSessionController {
    backend: Arc<dyn TaskBackend>,
    poll_interval: Duration,
    bounds: PromptBounds,
    state: Arc<watch::Sender<SessionSnapshot>>,
    epoch: Arc<AtomicU64>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSessionController {
    pub fn new(config: &ClientConfig, backend: Arc<dyn TaskBackend>) -> Self {
        let (tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            backend,
            poll_interval: config.poll_interval,
            bounds: config.prompt_bounds,
            state: Arc::new(tx),
            epoch: Arc::new(AtomicU64::new(0)),
            poller: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Validate and submit `raw`, then start polling the created task.
    ///
    /// Validation failures set the inline error and never reach the backend.
    /// Returns the new task id.
    pub async fn submit_prompt(&self, raw: &str) -> Result<String> {
        let prompt = match sanitize_prompt(raw, self.bounds) {
            Ok(prompt) => prompt,
            Err(err) => {
                self.state
                    .send_modify(|s| s.error = Some(err.to_string()));
                return Err(err.into());
            }
        };

        let mut epoch = 0;
        self.state.send_modify(|s| {
            epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            s.error = None;
            s.is_creating = true;
        });
        self.stop_polling();

        let result = self.backend.create_task(&prompt).await;

        let mut current = false;
        self.state.send_if_modified(|s| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            current = true;
            s.is_creating = false;
            match &result {
                Ok(created) => {
                    s.task = Some(Task::pending(created.task_id.clone(), prompt.clone()));
                }
                Err(err) => {
                    s.task = None;
                    s.error = Some(err.user_message());
                }
            }
            true
        });

        if !current {
            debug!("task creation finished after the session moved on");
            return Err(ClientError::Superseded);
        }

        match result {
            Ok(created) => {
                let redacted = redact_text(&prompt);
                info!(task_id = %created.task_id, prompt = %redacted, "task created");
                emit_event(
                    Level::INFO,
                    ObservabilityEvent {
                        event: "task.created",
                        component: "session",
                        task_id: Some(&created.task_id),
                        status: Some("pending"),
                        detail: Some(&redacted),
                        ..Default::default()
                    },
                );
                if !self.start_polling(created.task_id.clone(), epoch) {
                    return Err(ClientError::Superseded);
                }
                Ok(created.task_id)
            }
            Err(err) => {
                warn!(error = %err, "task creation failed");
                emit_event(
                    Level::WARN,
                    ObservabilityEvent {
                        event: "task.create_failed",
                        component: "session",
                        status: Some("failed"),
                        error_code: Some(error_code(&err)),
                        ..Default::default()
                    },
                );
                Err(err)
            }
        }
    }

    /// Stop polling and clear the task, error and creating flag.
    pub fn reset(&self) {
        self.state.send_modify(|s| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *s = SessionSnapshot::default();
        });
        self.stop_polling();
    }

    fn stop_polling(&self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
            debug!("poll loop stopped");
        }
    }

    /// Spawn the poll loop unless the session has moved past `epoch`. The
    /// check runs under the poller lock, which `reset` also takes after
    /// advancing the epoch.
    fn start_polling(&self, task_id: String, epoch: u64) -> bool {
        let mut poller = self.poller.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(task_id = %task_id, "not polling a superseded task");
            return false;
        }
        let ctx = PollContext {
            backend: self.backend.clone(),
            state: self.state.clone(),
            epoch_counter: self.epoch.clone(),
            epoch,
            task_id,
            interval: self.poll_interval,
        };
        if let Some(old) = poller.replace(tokio::spawn(poll_task(ctx))) {
            old.abort();
        }
        true
    }
}

impl Drop for TaskSessionController {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.get_mut().take() {
            handle.abort();
        }
    }
}

fn error_code(err: &ClientError) -> &'static str {
    match err {
        ClientError::Validation(_) => "validation",
        ClientError::Request { .. } => "request",
        ClientError::Transport(_) => "transport",
        ClientError::Serialization(_) => "serialization",
        ClientError::Channel(_) => "channel",
        ClientError::InvalidConfig(_) => "config",
        ClientError::Superseded => "superseded",
    }
}

struct PollContext {
    backend: Arc<dyn TaskBackend>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    epoch_counter: Arc<AtomicU64>,
    epoch: u64,
    task_id: String,
    interval: Duration,
}

impl PollContext {
    fn is_current(&self) -> bool {
        self.epoch_counter.load(Ordering::SeqCst) == self.epoch
    }
}

async fn poll_task(ctx: PollContext) {
    let mut ticker = interval_at(Instant::now() + ctx.interval, ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match ctx.backend.get_task(&ctx.task_id).await {
            Ok(task) => {
                let status = task.status;
                let mut current = false;
                ctx.state.send_if_modified(|s| {
                    if !ctx.is_current() {
                        return false;
                    }
                    current = true;
                    s.task = Some(task);
                    true
                });
                if !current {
                    return;
                }
                debug!(task_id = %ctx.task_id, status = %status, "task polled");
                if status.is_terminal() {
                    emit_event(
                        Level::INFO,
                        ObservabilityEvent {
                            event: "task.terminal",
                            component: "session",
                            task_id: Some(&ctx.task_id),
                            channel: Some(ChannelKind::Poll),
                            status: Some(status.as_str()),
                            ..Default::default()
                        },
                    );
                    return;
                }
            }
            Err(err) => {
                if !ctx.is_current() {
                    return;
                }
                warn!(task_id = %ctx.task_id, error = %err, "task poll failed; retrying next tick");
            }
        }
    }
}
