//! Error types for membership reconstruction.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GroupError>;

/// Errors raised while rebuilding a group or proving membership in it.
///
/// All of these mean the local view of the group cannot be trusted for this
/// attempt; the caller should re-sync before trying again.
#[derive(Debug, Error)]
pub enum GroupError {
    /// The membership feed could not be queried
    #[error("membership feed unavailable: {0}")]
    FeedUnavailable(String),

    /// The feed answered with data that does not parse
    #[error("malformed membership feed response: {0}")]
    MalformedFeed(String),

    /// Two records claim the same index
    #[error("duplicate membership index {0}")]
    DuplicateIndex(u64),

    /// Indices must be dense starting from zero
    #[error("membership indices are not contiguous: expected {expected}, found {found}")]
    IndexGap { expected: u64, found: u64 },

    /// No live member has this commitment
    #[error("member not found in group")]
    MemberNotFound,

    /// The same commitment appears at several live indices
    #[error("commitment appears {0} times in group")]
    DuplicateMember(usize),

    #[error("leaf index {index} out of range for tree of size {size}")]
    LeafOutOfRange { index: u64, size: u64 },

    #[error("poseidon hashing failed: {0}")]
    Hash(String),

    /// The reconstructed tree disagrees with the authoritative on-chain root
    #[error("merkle root mismatch: reconstructed {local}, on-chain {onchain}")]
    RootMismatch { local: String, onchain: String },

    #[error("merkle size mismatch: reconstructed {local}, on-chain {onchain}")]
    SizeMismatch { local: u64, onchain: u64 },

    /// The on-chain oracle call failed
    #[error("on-chain oracle error: {0}")]
    Oracle(String),
}

impl From<light_poseidon::PoseidonError> for GroupError {
    fn from(e: light_poseidon::PoseidonError) -> Self {
        GroupError::Hash(e.to_string())
    }
}
