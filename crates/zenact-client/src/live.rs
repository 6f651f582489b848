//! Live Event Synchronizer.
//!
//! Keeps one push-channel connection per task id and folds its frames into a
//! [`LiveState`]. Every task id gets a fresh worker task; the worker owns the
//! connection and the backoff sleep, so aborting it cancels both. Workers tag
//! their writes with the state epoch they were started for, and the epoch moves
//! on whenever the task id changes.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Level};
use zenact_observability::{emit_event, ChannelKind, ObservabilityEvent};
use zenact_wire::parse_live_frame;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::live_state::{ChannelPhase, LiveState};
use crate::reconnect::ReconnectPolicy;
use crate::transport::{LiveConnection, LiveTransport, WsTransport};

struct ChannelWorker {
    task_id: String,
    handle: JoinHandle<()>,
}

pub struct LiveEventSynchronizer {
    config: ClientConfig,
    transport: Arc<dyn LiveTransport>,
    state: Arc<watch::Sender<LiveState>>,
    worker: Mutex<Option<ChannelWorker>>,
}

impl LiveEventSynchronizer {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(WsTransport))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn LiveTransport>) -> Self {
        let (tx, _) = watch::channel(LiveState::default());
        Self {
            config,
            transport,
            state: Arc::new(tx),
            worker: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> LiveState {
        self.state.borrow().clone()
    }

    pub fn task_id(&self) -> Option<String> {
        self.state.borrow().task_id().map(str::to_string)
    }

    /// Point the synchronizer at `task_id`.
    ///
    /// Passing the id it already follows is a no-op. Anything else tears down
    /// the current connection and any pending reconnect, clears the
    /// accumulated state, and starts connecting when `task_id` is present.
    /// Must be called from within a tokio runtime.
    pub fn set_task_id(&self, task_id: Option<&str>) -> Result<()> {
        let target = match task_id {
            Some(id) => Some((id, self.config.task_ws_url(id)?)),
            None => None,
        };
        self.follow(target);
        Ok(())
    }

    pub fn shutdown(&self) {
        self.follow(None);
    }

    fn follow(&self, target: Option<(&str, String)>) {
        let task_id = target.as_ref().map(|(id, _)| *id);

        let mut worker = self.worker.lock();
        let current = worker.as_ref().map(|w| w.task_id.as_str());
        if current == task_id && (task_id.is_some() || self.state.borrow().task_id().is_none()) {
            return;
        }

        if let Some(old) = worker.take() {
            old.handle.abort();
            debug!(task_id = %old.task_id, "push channel torn down");
        }

        let mut epoch = 0;
        self.state.send_modify(|state| {
            state.reset(task_id);
            epoch = state.epoch();
        });

        if let Some((task_id, url)) = target {
            let ctx = ChannelContext {
                transport: self.transport.clone(),
                state: self.state.clone(),
                policy: self.config.reconnect,
                url,
                task_id: task_id.to_string(),
                epoch,
            };
            *worker = Some(ChannelWorker {
                task_id: task_id.to_string(),
                handle: tokio::spawn(run_channel(ctx)),
            });
        }
    }
}

impl Drop for LiveEventSynchronizer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.handle.abort();
        }
    }
}

enum PumpExit {
    /// A terminal outcome was recorded.
    Terminal,
    /// The peer closed or the connection failed.
    Dropped,
    /// The task id changed underneath this worker.
    Superseded,
}

struct ChannelContext {
    transport: Arc<dyn LiveTransport>,
    state: Arc<watch::Sender<LiveState>>,
    policy: ReconnectPolicy,
    url: String,
    task_id: String,
    epoch: u64,
}

impl ChannelContext {
    /// Run `f` against the state if this worker is still current. Returns
    /// `false` once the worker has been superseded.
    fn update(&self, f: impl FnOnce(&mut LiveState) -> bool) -> bool {
        let mut current = false;
        self.state.send_if_modified(|state| {
            if state.epoch() != self.epoch {
                return false;
            }
            current = true;
            f(state)
        });
        current
    }

    fn set_phase(&self, phase: ChannelPhase) -> bool {
        self.update(|state| state.set_phase(phase))
    }

    async fn pump(&self, conn: &mut dyn LiveConnection) -> PumpExit {
        while let Some(frame) = conn.next_frame().await {
            let text = match frame {
                Ok(text) => text,
                Err(err) => {
                    warn!(task_id = %self.task_id, error = %err, "push channel read failed");
                    return PumpExit::Dropped;
                }
            };

            let event = match parse_live_frame(&text) {
                Ok(event) => event,
                Err(err) => {
                    warn!(task_id = %self.task_id, error = %err, "dropping malformed push frame");
                    continue;
                }
            };

            if !event.task_id().is_empty() && event.task_id() != self.task_id {
                warn!(
                    task_id = %self.task_id,
                    frame_task_id = %event.task_id(),
                    "dropping push frame for another task"
                );
                continue;
            }

            let kind = event.kind();
            let terminal = event.is_terminal();
            if !self.update(|state| state.apply(event)) {
                return PumpExit::Superseded;
            }
            debug!(task_id = %self.task_id, kind, "push event applied");
            if terminal {
                return PumpExit::Terminal;
            }
        }
        PumpExit::Dropped
    }
}

async fn run_channel(ctx: ChannelContext) {
    let mut attempt: u32 = 0;

    loop {
        if !ctx.set_phase(ChannelPhase::Connecting) {
            return;
        }

        match ctx.transport.connect(&ctx.url).await {
            Ok(mut conn) => {
                attempt = 0;
                if !ctx.set_phase(ChannelPhase::Open) {
                    conn.close().await;
                    return;
                }
                info!(task_id = %ctx.task_id, "push channel open");

                match ctx.pump(conn.as_mut()).await {
                    PumpExit::Terminal => {
                        conn.close().await;
                        ctx.set_phase(ChannelPhase::Closed);
                        emit_event(
                            Level::INFO,
                            ObservabilityEvent {
                                event: "push.terminal",
                                component: "live",
                                task_id: Some(&ctx.task_id),
                                channel: Some(ChannelKind::Push),
                                status: Some("closed"),
                                ..Default::default()
                            },
                        );
                        return;
                    }
                    PumpExit::Superseded => {
                        conn.close().await;
                        return;
                    }
                    PumpExit::Dropped => {
                        info!(task_id = %ctx.task_id, "push channel closed by peer");
                    }
                }
            }
            Err(err) => {
                warn!(task_id = %ctx.task_id, attempt, error = %err, "push channel connect failed");
            }
        }

        let Some(delay) = ctx.policy.delay_for(attempt) else {
            ctx.set_phase(ChannelPhase::Exhausted);
            warn!(
                task_id = %ctx.task_id,
                attempts = attempt,
                "push channel reconnect budget exhausted; relying on polling"
            );
            emit_event(
                Level::WARN,
                ObservabilityEvent {
                    event: "push.reconnect_exhausted",
                    component: "live",
                    task_id: Some(&ctx.task_id),
                    channel: Some(ChannelKind::Push),
                    attempt: Some(attempt),
                    status: Some("exhausted"),
                    ..Default::default()
                },
            );
            return;
        };

        attempt += 1;
        if !ctx.set_phase(ChannelPhase::Waiting { attempt, delay }) {
            return;
        }
        info!(
            task_id = %ctx.task_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling push channel reconnect"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{complete_frame, frame, step_frame, Script, ScriptedTransport};
    use std::time::Duration;
    use zenact_wire::LiveEvent;

    fn synchronizer(transport: Arc<ScriptedTransport>) -> LiveEventSynchronizer {
        LiveEventSynchronizer::with_transport(ClientConfig::default(), transport)
    }

    fn iterations(state: &LiveState) -> Vec<u32> {
        state.steps().iter().map(|s| s.iteration).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_delays_double_until_budget_is_spent() {
        let transport = ScriptedTransport::new(vec![]);
        let live = synchronizer(transport.clone());
        let mut rx = live.subscribe();

        live.set_task_id(Some("t1")).unwrap();
        rx.wait_for(|s| s.phase() == ChannelPhase::Exhausted)
            .await
            .unwrap();

        assert_eq!(transport.connect_count(), 6);
        assert_eq!(
            transport.connect_gaps_ms(),
            vec![1000, 2000, 4000, 8000, 16000]
        );
        assert_eq!(
            transport.connect_urls()[0],
            "ws://localhost:8080/api/task/t1/ws"
        );

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.connect_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_open_resets_attempt_counter() {
        let transport = ScriptedTransport::new(vec![Script::Refuse, Script::Frames(vec![])]);
        let live = synchronizer(transport.clone());
        let mut rx = live.subscribe();

        live.set_task_id(Some("t1")).unwrap();
        rx.wait_for(|s| s.phase() == ChannelPhase::Exhausted)
            .await
            .unwrap();

        assert_eq!(transport.connect_count(), 7);
        assert_eq!(
            transport.connect_gaps_ms(),
            vec![1000, 1000, 2000, 4000, 8000, 16000]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_phase_reports_next_attempt() {
        let transport = ScriptedTransport::new(vec![]);
        let live = synchronizer(transport.clone());
        let mut rx = live.subscribe();

        live.set_task_id(Some("t1")).unwrap();
        let phase = rx
            .wait_for(|s| matches!(s.phase(), ChannelPhase::Waiting { .. }))
            .await
            .unwrap()
            .phase();
        assert_eq!(
            phase,
            ChannelPhase::Waiting {
                attempt: 1,
                delay: Duration::from_millis(1000)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_event_closes_without_reconnecting() {
        let transport = ScriptedTransport::new(vec![Script::Frames(vec![
            step_frame("t1", 1, "shot-1"),
            complete_frame("t1", "Flight booked"),
            step_frame("t1", 2, "late"),
        ])]);
        let live = synchronizer(transport.clone());
        let mut rx = live.subscribe();

        live.set_task_id(Some("t1")).unwrap();
        rx.wait_for(|s| s.phase() == ChannelPhase::Closed)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        let state = live.snapshot();
        assert_eq!(state.completion_message(), Some("Flight booked"));
        assert_eq!(iterations(&state), vec![1]);
        assert_eq!(state.screenshot(), Some("shot-1"));
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_event_is_terminal_too() {
        let transport = ScriptedTransport::new(vec![Script::Hold(vec![frame(
            LiveEvent::TaskFailed {
                task_id: "t1".into(),
                error: None,
            },
        )])]);
        let live = synchronizer(transport.clone());
        let mut rx = live.subscribe();

        live.set_task_id(Some("t1")).unwrap();
        rx.wait_for(|s| s.phase() == ChannelPhase::Closed)
            .await
            .unwrap();
        assert_eq!(live.snapshot().failure_error(), Some("Task failed"));
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_and_foreign_frames_are_dropped() {
        let transport = ScriptedTransport::new(vec![Script::Hold(vec![
            "garbage".to_string(),
            r#"{"type":"teleport","task_id":"t1"}"#.to_string(),
            step_frame("other-task", 5, "foreign"),
            step_frame("t1", 1, ""),
        ])]);
        let live = synchronizer(transport.clone());
        let mut rx = live.subscribe();

        live.set_task_id(Some("t1")).unwrap();
        rx.wait_for(|s| !s.steps().is_empty()).await.unwrap();

        let state = live.snapshot();
        assert_eq!(iterations(&state), vec![1]);
        assert!(state.screenshot().is_none());
        assert!(state.is_connected());
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replayed_steps_after_reconnect_are_deduplicated() {
        let transport = ScriptedTransport::new(vec![
            Script::Frames(vec![step_frame("t1", 1, ""), step_frame("t1", 2, "")]),
            Script::Hold(vec![
                step_frame("t1", 1, ""),
                step_frame("t1", 2, ""),
                step_frame("t1", 3, ""),
            ]),
        ]);
        let live = synchronizer(transport.clone());
        let mut rx = live.subscribe();

        live.set_task_id(Some("t1")).unwrap();
        rx.wait_for(|s| s.steps().len() == 3).await.unwrap();

        assert_eq!(iterations(&live.snapshot()), vec![1, 2, 3]);
        assert_eq!(transport.connect_gaps_ms(), vec![1000]);
    }

    #[tokio::test(start_paused = true)]
    async fn changing_task_id_resets_before_new_events() {
        let transport = ScriptedTransport::new(vec![
            Script::Hold(vec![
                step_frame("t1", 1, "old-shot"),
                complete_frame("t1", "done"),
            ]),
            Script::Hold(vec![step_frame("t2", 7, "")]),
        ]);
        let live = synchronizer(transport.clone());
        let mut rx = live.subscribe();

        live.set_task_id(Some("t1")).unwrap();
        rx.wait_for(|s| s.is_terminal()).await.unwrap();

        live.set_task_id(Some("t2")).unwrap();
        let state = live.snapshot();
        assert_eq!(state.task_id(), Some("t2"));
        assert!(state.steps().is_empty());
        assert!(state.screenshot().is_none());
        assert!(!state.is_terminal());
        assert_eq!(state.phase(), ChannelPhase::Connecting);

        rx.wait_for(|s| !s.steps().is_empty()).await.unwrap();
        let state = live.snapshot();
        assert_eq!(iterations(&state), vec![7]);
        assert_eq!(
            transport.connect_urls()[1],
            "ws://localhost:8080/api/task/t2/ws"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn same_task_id_is_a_noop() {
        let transport = ScriptedTransport::new(vec![Script::Hold(vec![step_frame("t1", 1, "")])]);
        let live = synchronizer(transport.clone());
        let mut rx = live.subscribe();

        live.set_task_id(Some("t1")).unwrap();
        rx.wait_for(|s| !s.steps().is_empty()).await.unwrap();
        live.set_task_id(Some("t1")).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(iterations(&live.snapshot()), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_reconnect() {
        let transport = ScriptedTransport::new(vec![]);
        let live = synchronizer(transport.clone());
        let mut rx = live.subscribe();

        live.set_task_id(Some("t1")).unwrap();
        rx.wait_for(|s| matches!(s.phase(), ChannelPhase::Waiting { .. }))
            .await
            .unwrap();

        live.shutdown();
        assert_eq!(live.snapshot().phase(), ChannelPhase::Idle);
        assert!(live.task_id().is_none());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(live.snapshot().phase(), ChannelPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_when_idle_leaves_state_alone() {
        let transport = ScriptedTransport::new(vec![]);
        let live = synchronizer(transport.clone());
        let before = live.snapshot().epoch();

        live.shutdown();
        live.shutdown();
        assert_eq!(live.snapshot().epoch(), before);
        assert_eq!(live.snapshot().phase(), ChannelPhase::Idle);
        assert_eq!(transport.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_synchronizer_stops_worker() {
        let transport = ScriptedTransport::new(vec![]);
        {
            let live = synchronizer(transport.clone());
            let mut rx = live.subscribe();
            live.set_task_id(Some("t1")).unwrap();
            rx.wait_for(|s| matches!(s.phase(), ChannelPhase::Waiting { .. }))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.connect_count(), 1);
    }
}
