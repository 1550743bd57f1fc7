use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuestlineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported postback event: {0}")]
    UnsupportedEvent(String),

    #[error("Postback event '{event}' does not match task type '{task_type}'")]
    TypeMismatch { event: String, task_type: String },

    #[error("Insufficient balance: has {has}, needs {needs}")]
    InsufficientBalance { has: u64, needs: u64 },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("External service error: {0}")]
    External(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for QuestlineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QuestlineError>;
