use async_trait::async_trait;
use tracing::debug;

use crate::error::{ArtifactError, Result};

/// Retrieves the raw bytes behind an artifact URL.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

#[async_trait]
impl<T: ArtifactFetcher + ?Sized> ArtifactFetcher for &T {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        (**self).fetch(url).await
    }
}

/// Plain HTTP(S) GET; any non-2xx status is a failed download.
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let download_err = |reason: String| ArtifactError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?
            .error_for_status()
            .map_err(|e| download_err(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_err(e.to_string()))?;

        debug!(url, size = bytes.len(), "downloaded artifact");
        Ok(bytes.to_vec())
    }
}
