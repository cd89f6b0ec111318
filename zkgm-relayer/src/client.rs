//! Relay transport: the [`RelayApi`] seam and its Gelato implementation.

use async_trait::async_trait;
use ethers::types::{Address, Bytes};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{RelayError, Result},
    task::TaskStatus,
};

/// A fee-paid call the relay should forward to `target`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayRequest {
    pub chain_id: u64,
    pub target: Address,
    pub data: Bytes,
    pub fee_token: Address,
}

/// Operations the submission client needs from a relay.
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Hand a call to the relay; returns the relay's task id.
    async fn submit(&self, request: &RelayRequest) -> Result<String>;

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus>;
}

#[async_trait]
impl<T: RelayApi + ?Sized> RelayApi for &T {
    async fn submit(&self, request: &RelayRequest) -> Result<String> {
        (**self).submit(request).await
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        (**self).task_status(task_id).await
    }
}

#[async_trait]
impl<T: RelayApi + ?Sized> RelayApi for Box<T> {
    async fn submit(&self, request: &RelayRequest) -> Result<String> {
        (**self).submit(request).await
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        (**self).task_status(task_id).await
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallWithSyncFeeBody<'a> {
    chain_id: String,
    target: Address,
    data: &'a Bytes,
    fee_token: Address,
    is_relay_context: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sponsor_api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    task: TaskStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Gelato relay HTTP API (`callWithSyncFee` plus task status).
#[derive(Clone, Debug)]
pub struct GelatoRelay {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GelatoRelay {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RelayApi for GelatoRelay {
    async fn submit(&self, request: &RelayRequest) -> Result<String> {
        let url = format!("{}/relays/v2/call-with-sync-fee", self.base_url);
        let body = CallWithSyncFeeBody {
            chain_id: request.chain_id.to_string(),
            target: request.target,
            data: &request.data,
            fee_token: request.fee_token,
            is_relay_context: true,
            sponsor_api_key: self.api_key.as_deref(),
        };
        debug!("Relaying call to {:?} on chain {}", request.target, request.chain_id);

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let reason = serde_json::from_str::<ErrorBody>(&text)
                .map(|e| e.message)
                .unwrap_or_else(|_| format!("HTTP {}: {}", status, text));
            return Err(RelayError::Rejected(reason));
        }

        let parsed: SubmitResponse = serde_json::from_str(&text)
            .map_err(|e| RelayError::MalformedResponse(e.to_string()))?;
        Ok(parsed.task_id)
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        let url = format!("{}/tasks/status/{}", self.base_url, task_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?;
        let parsed: StatusResponse = response
            .json()
            .await
            .map_err(|e| RelayError::MalformedResponse(e.to_string()))?;
        Ok(parsed.task)
    }
}
