//! Client side of the Zenact task monitor.
//!
//! Two independent sources describe a running task: the session controller
//! polls the REST API, and the live synchronizer listens on the per-task push
//! channel. Each keeps its own state; [`merge_view`] combines them when read.

pub mod api;
pub mod config;
pub mod error;
pub mod live;
pub mod live_state;
pub mod monitor;
pub mod reconnect;
pub mod sanitize;
pub mod session;
pub mod transport;
pub mod view;

#[cfg(test)]
mod test_support;

pub use api::{TaskApiClient, TaskBackend};
pub use config::ClientConfig;
pub use error::{ClientError, Result, ValidationError, SERVER_UNREACHABLE_MESSAGE};
pub use live::LiveEventSynchronizer;
pub use live_state::{ChannelPhase, LiveState, TerminalOutcome};
pub use monitor::{MonitorSnapshot, TaskMonitor};
pub use reconnect::ReconnectPolicy;
pub use sanitize::{sanitize_prompt, PromptBounds};
pub use session::{SessionSnapshot, TaskSessionController};
pub use transport::{LiveConnection, LiveTransport, WsTransport};
pub use view::{merge_view, user_error, StepSource, TaskView};
