use thiserror::Error;

pub const SERVER_UNREACHABLE_MESSAGE: &str = "Failed to create task. Is the server running?";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Prompt must be at least {min} characters")]
    TooShort { min: usize },

    #[error("Prompt must be {max} characters or fewer")]
    TooLong { max: usize },
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backend answered with a non-success status.
    #[error("{message}")]
    Request { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Task submission was superseded by a reset")]
    Superseded,
}

impl ClientError {
    /// Text suitable for the inline error banner.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(err) => err.to_string(),
            ClientError::Request { message, .. } => message.clone(),
            ClientError::Transport(_)
            | ClientError::Channel(_)
            | ClientError::Serialization(_) => SERVER_UNREACHABLE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Channel(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
