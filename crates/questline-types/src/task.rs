use crate::error::QuestlineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task category. `registration` and `deposit` are the two types that
/// third-party postbacks may confirm; anything else is free-form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    Registration,
    Deposit,
    Other(String),
}

impl TaskType {
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::Registration => "registration",
            TaskType::Deposit => "deposit",
            TaskType::Other(s) => s,
        }
    }
}

impl From<String> for TaskType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "registration" => TaskType::Registration,
            "deposit" => TaskType::Deposit,
            _ => TaskType::Other(s),
        }
    }
}

impl From<&str> for TaskType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<TaskType> for String {
    fn from(t: TaskType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rarity tier of a task. Limited deposit tasks trigger the referral
/// cascade on completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Rarity {
    Normal,
    Limited,
    Other(String),
}

impl Rarity {
    pub fn as_str(&self) -> &str {
        match self {
            Rarity::Normal => "Normal",
            Rarity::Limited => "Limited",
            Rarity::Other(s) => s,
        }
    }
}

impl From<String> for Rarity {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Normal" => Rarity::Normal,
            "Limited" => Rarity::Limited,
            _ => Rarity::Other(s),
        }
    }
}

impl From<&str> for Rarity {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Rarity> for String {
    fn from(r: Rarity) -> Self {
        r.as_str().to_string()
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-user completion state for a task. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Pending,
    Completed,
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionStatus::Pending => write!(f, "pending"),
            CompletionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Event kind carried by an affiliate-network postback. Only these two
/// events are accepted at the postback boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostbackEvent {
    Registration,
    Deposit,
}

impl PostbackEvent {
    pub fn parse(event: &str) -> Result<Self, QuestlineError> {
        match event {
            "registration" => Ok(PostbackEvent::Registration),
            "deposit" => Ok(PostbackEvent::Deposit),
            other => Err(QuestlineError::UnsupportedEvent(other.to_string())),
        }
    }

    /// A postback may only complete a task whose type matches the
    /// event exactly.
    pub fn matches(&self, task_type: &TaskType) -> bool {
        matches!(
            (self, task_type),
            (PostbackEvent::Registration, TaskType::Registration)
                | (PostbackEvent::Deposit, TaskType::Deposit)
        )
    }
}

impl fmt::Display for PostbackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostbackEvent::Registration => write!(f, "registration"),
            PostbackEvent::Deposit => write!(f, "deposit"),
        }
    }
}
