//! Error types for proof submission.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Failures talking to the relay.
///
/// An on-chain revert or a cancelled task is not an error; it comes back as
/// the terminal state of a [`RelayTask`](crate::RelayTask).
#[derive(Debug, Error)]
pub enum RelayError {
    /// The relay refused the request
    #[error("relay rejected submission: {0}")]
    Rejected(String),

    /// The relay could not be reached
    #[error("relay transport error: {0}")]
    Transport(String),

    /// Polling stopped because a status query failed
    #[error("failed to check status of task {task_id}: {reason}")]
    StatusCheckFailed { task_id: String, reason: String },

    #[error("malformed relay response: {0}")]
    MalformedResponse(String),

    /// Proof or public signals cannot be turned into calldata
    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error("invalid address {0}")]
    InvalidAddress(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Transport(e.to_string())
    }
}
