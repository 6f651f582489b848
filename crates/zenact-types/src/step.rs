use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Navigate,
    Click,
    Type,
    Scroll,
    Wait,
    Done,
    Hold,
    Drag,
    /// Anything a newer agent emits that this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Navigate => "navigate",
            ActionType::Click => "click",
            ActionType::Type => "type",
            ActionType::Scroll => "scroll",
            ActionType::Wait => "wait",
            ActionType::Done => "done",
            ActionType::Hold => "hold",
            ActionType::Drag => "drag",
            ActionType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Action {
    #[serde(rename = "action")]
    pub kind: ActionType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selector: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub success: bool,
}

/// One iteration of the agent loop. `iteration` identifies the step within
/// its task; `screenshot` is a base64 PNG and is only populated on steps
/// delivered over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub screenshot: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub thought: String,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
}

impl Step {
    pub fn has_screenshot(&self) -> bool {
        !self.screenshot.is_empty()
    }
}
