use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::api::{TaskApiClient, TaskBackend};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::live::LiveEventSynchronizer;
use crate::live_state::LiveState;
use crate::session::{SessionSnapshot, TaskSessionController};
use crate::transport::{LiveTransport, WsTransport};
use crate::view::{merge_view, user_error, TaskView};

/// Owned copies of both component states at one instant.
#[derive(Debug, Clone, Default)]
pub struct MonitorSnapshot {
    pub session: SessionSnapshot,
    pub live: LiveState,
}

impl MonitorSnapshot {
    /// Merged view of the active task, if any.
    pub fn view(&self) -> Option<TaskView<'_>> {
        self.session
            .task
            .as_ref()
            .map(|task| merge_view(task, &self.live))
    }

    pub fn user_error(&self) -> Option<&str> {
        user_error(&self.session, &self.live)
    }
}

/// Wires a session controller to a live synchronizer and keeps the
/// synchronizer following whichever task the controller holds.
pub struct TaskMonitor {
    session: Arc<TaskSessionController>,
    live: Arc<LiveEventSynchronizer>,
    session_rx: watch::Receiver<SessionSnapshot>,
    live_rx: watch::Receiver<LiveState>,
}

impl TaskMonitor {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let backend = Arc::new(TaskApiClient::new(config.clone())?);
        Ok(Self::with_parts(config, backend, Arc::new(WsTransport)))
    }

    pub fn with_parts(
        config: ClientConfig,
        backend: Arc<dyn TaskBackend>,
        transport: Arc<dyn LiveTransport>,
    ) -> Self {
        let session = Arc::new(TaskSessionController::new(&config, backend));
        let live = Arc::new(LiveEventSynchronizer::with_transport(config, transport));
        let session_rx = session.subscribe();
        let live_rx = live.subscribe();
        Self {
            session,
            live,
            session_rx,
            live_rx,
        }
    }

    pub fn session(&self) -> &Arc<TaskSessionController> {
        &self.session
    }

    pub fn live(&self) -> &Arc<LiveEventSynchronizer> {
        &self.live
    }

    /// Submit a prompt and point the push channel at the new task.
    pub async fn submit(&self, raw: &str) -> Result<String> {
        let result = self.session.submit_prompt(raw).await;
        self.sync_live()?;
        result
    }

    pub fn reset(&self) {
        self.session.reset();
        self.live.shutdown();
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            session: self.session.snapshot(),
            live: self.live.snapshot(),
        }
    }

    /// Resolves once either component publishes a change. Returns `false`
    /// when both sides are gone.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            res = self.session_rx.changed() => res.is_ok(),
            res = self.live_rx.changed() => res.is_ok(),
        }
    }

    fn sync_live(&self) -> Result<()> {
        let task_id = self.session.snapshot().task.map(|t| t.id);
        debug!(task_id = ?task_id, "syncing push channel with session");
        self.live.set_task_id(task_id.as_deref())
    }
}
