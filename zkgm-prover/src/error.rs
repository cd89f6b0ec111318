//! Pipeline error type.

use std::path::PathBuf;

use thiserror::Error;
use zkgm_artifacts::ArtifactError;
use zkgm_common::FieldError;
use zkgm_group::GroupError;
use zkgm_relayer::RelayError;
use zkgm_witness::WitnessError;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Any failure along the prove-and-submit path, tagged by stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Witness(#[from] WitnessError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The request cannot be carried out as given
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The external prover failed or produced unusable output
    #[error("prover failed: {0}")]
    Prover(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> PipelineError {
    let path = path.into();
    move |source| PipelineError::Io { path, source }
}
