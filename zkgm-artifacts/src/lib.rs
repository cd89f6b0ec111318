//! Acquisition and caching of the circuit binary and proving key.

pub mod cache;
pub mod error;
pub mod fetcher;

pub use cache::{ArtifactCache, ArtifactManifest, ArtifactUrls, MANIFEST_FILE};
pub use error::{ArtifactError, Result};
pub use fetcher::{ArtifactFetcher, HttpFetcher};
