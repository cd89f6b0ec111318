use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Errors raised while acquiring circuit artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The artifact host could not be reached or refused the request
    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid artifact manifest at {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    /// The artifact is not in the cache
    #[error("artifact not cached: {0}")]
    NotCached(PathBuf),

    /// A cached file no longer matches the digest recorded at download time
    #[error("{label} hash mismatch, expected {expected} but computed {actual}")]
    IntegrityMismatch {
        label: &'static str,
        expected: String,
        actual: String,
    },

    #[error("{label} size mismatch, manifest recorded {expected} bytes but found {actual}")]
    SizeMismatch {
        label: &'static str,
        expected: u64,
        actual: u64,
    },
}

impl ArtifactError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArtifactError::Io {
            path: path.into(),
            source,
        }
    }
}
