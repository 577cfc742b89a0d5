//! HTTP API client for the metadata destination
//!
//! Thin typed wrapper over reqwest. Policy (retries, chunking, waiting)
//! lives in the orchestrator; this client does one request per call.

use crate::api::endpoints;
use crate::api::types::StatusResponse;
use crate::config::PublishConfig;
use crate::error::{PublishError, Result};
use cip_common::types::{ImportQueueRequest, ImportQueueResponse, ProgressUpdate};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Outcome of one import queue attempt
#[derive(Debug)]
pub enum QueueOutcome {
    /// Destination accepted the batch
    Accepted(ImportQueueResponse),
    /// Destination is still warming up; retry later
    NotReady { retry_after_secs: Option<u64> },
}

/// API client for the metadata destination
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client with an explicit request timeout
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Create a client pointed at the configured destination
    pub fn from_config(config: &PublishConfig) -> Result<Self> {
        Self::new(config.destination_url.clone(), config.api_timeout())
    }

    /// Check destination health. Transport errors report unhealthy rather
    /// than failing the caller.
    pub async fn health_check(&self) -> Result<bool> {
        let url = endpoints::health_url(&self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Fetch destination readiness and per-collection counts
    pub async fn get_status(&self) -> Result<StatusResponse> {
        let url = endpoints::status_url(&self.base_url);

        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Fetch one content record by id. 404 maps to `None`.
    pub async fn fetch_content(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let url = endpoints::content_url(&self.base_url, id);

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(response.json().await?))
    }

    /// Queue an import batch. A 503 maps to `NotReady` with the parsed
    /// Retry-After hint; any other error status is a hard failure.
    pub async fn queue_import(
        &self,
        kind: &str,
        request: &ImportQueueRequest,
    ) -> Result<QueueOutcome> {
        let url = endpoints::import_queue_url(&self.base_url, kind);

        let response = self.client.post(&url).json(request).send().await?;

        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Ok(QueueOutcome::NotReady { retry_after_secs });
        }

        let response = response.error_for_status()?;
        Ok(QueueOutcome::Accepted(response.json().await?))
    }

    /// Fetch the current state of an import batch. 404 maps to
    /// `BatchNotFound`.
    pub async fn import_status(&self, kind: &str, batch_id: &str) -> Result<ProgressUpdate> {
        let url = endpoints::import_status_url(&self.base_url, kind, batch_id);

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(PublishError::batch_not_found(batch_id));
        }
        let response = response.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Bulk-write documents to a destination collection.
    ///
    /// Counts in the result come from the server's acknowledgment only.
    pub async fn bulk_write(
        &self,
        collection: &str,
        documents: &[serde_json::Value],
    ) -> Result<cip_common::types::BulkWriteResult> {
        let url = endpoints::bulk_write_url(&self.base_url, collection);

        let response = self
            .client
            .post(&url)
            .json(documents)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
