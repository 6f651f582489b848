mod render;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use zenact_client::{
    merge_view, ChannelPhase, ClientConfig, LiveEventSynchronizer, TaskApiClient, TaskBackend,
    TaskMonitor,
};
use zenact_observability::{default_logs_dir, emit_event, init_process_logging, ObservabilityEvent};
use zenact_types::{Task, TaskStatus};

use crate::render::{ScreenshotSaver, TimelinePrinter};

#[derive(Parser, Debug)]
#[command(name = "zenact")]
#[command(about = "Submit browser-agent tasks and watch them run")]
struct Cli {
    /// Backend origin, e.g. http://localhost:8080.
    #[arg(long, env = "ZENACT_API_URL", global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a prompt and follow the task until it finishes.
    Run {
        prompt: String,
        /// Write the latest screenshot here as `<task-id>.png`.
        #[arg(long)]
        screenshot_dir: Option<PathBuf>,
    },
    /// Print one status snapshot as JSON.
    Status { task_id: String },
    /// Follow the push channel of an existing task.
    Watch { task_id: String },
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logs_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| default_logs_dir(dirs::data_dir()));
    let (_log_guard, log_info) = init_process_logging("cli", &logs_dir, 14)?;
    emit_event(
        Level::INFO,
        ObservabilityEvent {
            event: "logging.initialized",
            component: "cli.main",
            status: Some("ok"),
            detail: Some("cli jsonl logging initialized"),
            ..Default::default()
        },
    );
    info!("cli logging initialized: {:?}", log_info);

    let mut config = ClientConfig::from_env().context("invalid ZENACT_* configuration")?;
    if let Some(api_url) = cli.api_url.as_deref() {
        config = config
            .with_api_url(api_url)
            .with_context(|| format!("invalid --api-url `{api_url}`"))?;
    }

    match cli.command {
        Command::Run {
            prompt,
            screenshot_dir,
        } => run_task(config, &prompt, screenshot_dir).await,
        Command::Status { task_id } => {
            let client = TaskApiClient::new(config)?;
            let task = client
                .get_task(&task_id)
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            println!("{}", serde_json::to_string_pretty(&task)?);
            Ok(())
        }
        Command::Watch { task_id } => watch_task(config, &task_id).await,
        Command::Health => {
            let client = TaskApiClient::new(config.clone())?;
            if client.check_health().await.unwrap_or(false) {
                println!("ok: {}", config.api_url);
                Ok(())
            } else {
                bail!("backend at {} is not healthy", config.api_url)
            }
        }
    }
}

async fn run_task(
    config: ClientConfig,
    prompt: &str,
    screenshot_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut monitor = TaskMonitor::new(config)?;
    let task_id = match monitor.submit(prompt).await {
        Ok(task_id) => task_id,
        Err(err) => bail!(err.user_message()),
    };
    println!("task {task_id} submitted");

    let mut printer = TimelinePrinter::default();
    let mut saver = screenshot_dir.map(ScreenshotSaver::new);

    loop {
        let snapshot = monitor.snapshot();
        if let Some(view) = snapshot.view() {
            for line in printer.observe(&view) {
                println!("{line}");
            }

            if let (Some(saver), Some(shot)) = (saver.as_mut(), view.screenshot) {
                saver.save(&task_id, shot);
            }

            match view.status {
                TaskStatus::Completed => return Ok(()),
                TaskStatus::Failed => bail!(
                    "task {task_id} failed: {}",
                    view.failure.unwrap_or("Task failed")
                ),
                _ => {}
            }
        }

        tokio::select! {
            alive = monitor.changed() => {
                if !alive {
                    bail!("task monitor stopped unexpectedly");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                monitor.reset();
                println!("cancelled");
                return Ok(());
            }
        }
    }
}

async fn watch_task(config: ClientConfig, task_id: &str) -> anyhow::Result<()> {
    let max_attempts = config.reconnect.max_attempts;
    let live = LiveEventSynchronizer::new(config);
    let mut rx = live.subscribe();
    live.set_task_id(Some(task_id))?;

    // push-only: the placeholder contributes nothing but the id
    let placeholder = Task::pending(task_id, "");
    let mut printer = TimelinePrinter::default();

    loop {
        {
            let state = rx.borrow_and_update();
            let view = merge_view(&placeholder, &state);
            for line in printer.observe(&view) {
                println!("{line}");
            }
            if view.status == TaskStatus::Failed {
                bail!("task {task_id} failed");
            }
            if view.is_terminal() {
                return Ok(());
            }
            if state.phase() == ChannelPhase::Exhausted {
                bail!("push channel for {task_id} gave up after {max_attempts} reconnect attempts");
            }
        }

        tokio::select! {
            res = rx.changed() => res.context("push channel stopped")?,
            _ = tokio::signal::ctrl_c() => {
                live.shutdown();
                println!("cancelled");
                return Ok(());
            }
        }
    }
}
