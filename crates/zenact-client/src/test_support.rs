use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;
use zenact_types::{Action, ActionType, Step, Task, TaskStatus};
use zenact_wire::{CreateTaskResponse, LiveEvent};

use crate::api::TaskBackend;
use crate::error::{ClientError, Result};
use crate::transport::{LiveConnection, LiveTransport};

pub fn step(iteration: u32, screenshot: &str) -> Step {
    Step {
        iteration,
        screenshot: screenshot.to_string(),
        url: format!("https://flights.example/{iteration}"),
        title: format!("Page {iteration}"),
        thought: format!("thought {iteration}"),
        action: Action {
            kind: ActionType::Click,
            selector: format!("#step-{iteration}"),
            value: String::new(),
            done: false,
            success: false,
        },
        timestamp: Utc::now(),
    }
}

pub fn task(id: &str, status: TaskStatus, steps: Vec<Step>) -> Task {
    Task {
        id: id.to_string(),
        prompt: "Book a flight to Tokyo".to_string(),
        status,
        steps,
        error: None,
        created_at: Utc::now(),
        completed_at: None,
    }
}

pub fn step_frame(task_id: &str, iteration: u32, screenshot: &str) -> String {
    frame(LiveEvent::StepComplete {
        task_id: task_id.to_string(),
        step: step(iteration, screenshot),
    })
}

pub fn complete_frame(task_id: &str, message: &str) -> String {
    frame(LiveEvent::TaskComplete {
        task_id: task_id.to_string(),
        message: Some(message.to_string()),
    })
}

pub fn frame(event: LiveEvent) -> String {
    serde_json::to_string(&event).expect("serialize frame")
}

/// What the next `connect` call does.
pub enum Script {
    Refuse,
    /// Deliver the frames, then the peer closes.
    Frames(Vec<String>),
    /// Deliver the frames, then stay open.
    Hold(Vec<String>),
}

#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    connects: Mutex<Vec<(String, Instant)>>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    pub fn connect_urls(&self) -> Vec<String> {
        self.connects.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    /// Gaps between consecutive connect attempts, in milliseconds.
    pub fn connect_gaps_ms(&self) -> Vec<u128> {
        let connects = self.connects.lock();
        connects
            .windows(2)
            .map(|pair| (pair[1].1 - pair[0].1).as_millis())
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveTransport for ScriptedTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn LiveConnection>> {
        self.connects.lock().push((url.to_string(), Instant::now()));
        let script = self.scripts.lock().pop_front().unwrap_or(Script::Refuse);
        match script {
            Script::Refuse => Err(ClientError::Channel("connection refused".to_string())),
            Script::Frames(frames) => Ok(Box::new(ScriptedConnection {
                frames: frames.into(),
                hold: false,
                closes: self.closes.clone(),
            })),
            Script::Hold(frames) => Ok(Box::new(ScriptedConnection {
                frames: frames.into(),
                hold: true,
                closes: self.closes.clone(),
            })),
        }
    }
}

struct ScriptedConnection {
    frames: VecDeque<String>,
    hold: bool,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl LiveConnection for ScriptedConnection {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        if let Some(frame) = self.frames.pop_front() {
            return Some(Ok(frame));
        }
        if self.hold {
            std::future::pending::<()>().await;
        }
        None
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory backend answering from queues. An empty poll queue answers with
/// a request error, which the controller treats as a missed poll.
#[derive(Default)]
pub struct ScriptedBackend {
    creates: Mutex<VecDeque<Result<CreateTaskResponse>>>,
    polls: Mutex<VecDeque<Result<Task>>>,
    create_prompts: Mutex<Vec<String>>,
    poll_times: Mutex<Vec<Instant>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_create(&self, result: Result<CreateTaskResponse>) {
        self.creates.lock().push_back(result);
    }

    pub fn push_created(&self, task_id: &str) {
        self.push_create(Ok(CreateTaskResponse {
            task_id: task_id.to_string(),
            status: "pending".to_string(),
        }));
    }

    pub fn push_poll(&self, result: Result<Task>) {
        self.polls.lock().push_back(result);
    }

    pub fn create_prompts(&self) -> Vec<String> {
        self.create_prompts.lock().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.poll_times.lock().len()
    }

    pub fn poll_gaps_ms(&self) -> Vec<u128> {
        let times = self.poll_times.lock();
        times
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_millis())
            .collect()
    }
}

#[async_trait]
impl TaskBackend for ScriptedBackend {
    async fn create_task(&self, prompt: &str) -> Result<CreateTaskResponse> {
        self.create_prompts.lock().push(prompt.to_string());
        self.creates
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Channel("no scripted create".to_string())))
    }

    async fn get_task(&self, _task_id: &str) -> Result<Task> {
        self.poll_times.lock().push(Instant::now());
        self.polls.lock().pop_front().unwrap_or_else(|| {
            Err(ClientError::Request {
                status: 503,
                message: "no scripted poll".to_string(),
            })
        })
    }
}
