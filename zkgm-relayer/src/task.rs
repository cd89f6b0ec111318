//! Relay task lifecycle.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// State of a relay task as reported by the relay.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    CheckPending,
    ExecPending,
    WaitingForConfirmation,
    ExecSuccess,
    ExecReverted,
    Cancelled,
    /// A state this client does not know; treated as still in flight.
    Unknown(String),
}

impl TaskState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "CheckPending" => TaskState::CheckPending,
            "ExecPending" => TaskState::ExecPending,
            "WaitingForConfirmation" => TaskState::WaitingForConfirmation,
            "ExecSuccess" => TaskState::ExecSuccess,
            "ExecReverted" => TaskState::ExecReverted,
            "Cancelled" => TaskState::Cancelled,
            other => TaskState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskState::CheckPending => "CheckPending",
            TaskState::ExecPending => "ExecPending",
            TaskState::WaitingForConfirmation => "WaitingForConfirmation",
            TaskState::ExecSuccess => "ExecSuccess",
            TaskState::ExecReverted => "ExecReverted",
            TaskState::Cancelled => "Cancelled",
            TaskState::Unknown(raw) => raw,
        }
    }

    /// No further transitions happen after a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::ExecSuccess | TaskState::ExecReverted | TaskState::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskState::ExecSuccess)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TaskState::parse(&raw))
    }
}

/// Status document returned by the relay for one task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub task_state: TaskState,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub last_check_message: Option<String>,
}

/// Latest known view of a submitted task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayTask {
    pub id: String,
    pub state: TaskState,
    pub transaction_hash: Option<String>,
    pub last_message: Option<String>,
}

impl RelayTask {
    pub fn new(id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            state: status.task_state,
            transaction_hash: status.transaction_hash,
            last_message: status.last_check_message,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Human-readable progress line for the current state.
    pub fn status_message(&self) -> String {
        match &self.state {
            TaskState::CheckPending => "Verifying Submission...".to_string(),
            TaskState::ExecPending => "Waiting for finalization...".to_string(),
            TaskState::WaitingForConfirmation => match self.transaction_hash {
                Some(_) => "Submission approved. Waiting for confirmations...".to_string(),
                None => "Waiting for approval...".to_string(),
            },
            TaskState::ExecSuccess => "Verification successful!".to_string(),
            TaskState::ExecReverted => "Submission failed. Please try again.".to_string(),
            TaskState::Cancelled => "Submission cancelled. Please try again.".to_string(),
            TaskState::Unknown(raw) => format!("Unknown status: {}", raw),
        }
    }
}
