//! Import orchestration against the metadata destination
//!
//! Wraps the raw API with the policies the destination expects: bounded
//! retries while it warms up, chunked submission through the blob store,
//! and polling a queued batch to a terminal status.

use crate::api::{ApiClient, QueueOutcome};
use crate::blob::BlobPublisher;
use crate::config::{ImportConfig, PublishConfig, RetryConfig};
use crate::error::{PublishError, Result};
use cip_common::types::{
    BulkWriteResult, ContentRecord, ImportQueueRequest, ImportQueueResponse, ProgressUpdate,
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Destination collection names for the bulk-write helpers
const CONTENT_COLLECTION: &str = "content";
const PATHS_COLLECTION: &str = "paths";
const RELATIONSHIPS_COLLECTION: &str = "relationships";

/// Orchestrates import submissions and status tracking
pub struct ImportOrchestrator {
    api: ApiClient,
    retry: RetryConfig,
    import: ImportConfig,
    dry_run: bool,
}

impl ImportOrchestrator {
    /// Create an orchestrator from pipeline configuration
    pub fn from_config(config: &PublishConfig) -> Result<Self> {
        Ok(Self {
            api: ApiClient::from_config(config)?,
            retry: config.retry.clone(),
            import: config.import.clone(),
            dry_run: config.dry_run,
        })
    }

    /// Create an orchestrator around an existing client
    pub fn new(api: ApiClient, retry: RetryConfig, import: ImportConfig, dry_run: bool) -> Self {
        Self {
            api,
            retry,
            import,
            dry_run,
        }
    }

    /// Access the underlying API client
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Queue an import batch, retrying while the destination reports 503.
    ///
    /// A server-supplied Retry-After is honored up to the configured
    /// ceiling; without the header the default delay applies. When every
    /// allowed attempt comes back 503 the caller gets
    /// `NotReadyAfterRetries` rather than a generic HTTP error.
    pub async fn queue_import(
        &self,
        kind: &str,
        request: &ImportQueueRequest,
    ) -> Result<ImportQueueResponse> {
        if self.dry_run {
            return Ok(self.synthetic_accept(request));
        }

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self.api.queue_import(kind, request).await? {
                QueueOutcome::Accepted(response) => {
                    info!(
                        kind = %kind,
                        batch_id = %response.batch_id,
                        queued = response.queued_count,
                        "Import batch queued"
                    );
                    return Ok(response);
                },
                QueueOutcome::NotReady { retry_after_secs } => {
                    if attempts > self.retry.max_not_ready_retries {
                        return Err(PublishError::NotReadyAfterRetries { attempts });
                    }
                    let delay = match retry_after_secs {
                        Some(secs) => self.retry.clamp_delay(secs),
                        None => self.retry.default_delay(),
                    };
                    warn!(
                        kind = %kind,
                        attempt = attempts,
                        delay_secs = delay.as_secs(),
                        "Destination not ready; retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    /// Fetch the current state of a batch
    pub async fn get_status(&self, kind: &str, batch_id: &str) -> Result<ProgressUpdate> {
        self.api.import_status(kind, batch_id).await
    }

    /// Queue a batch and poll it to a terminal status.
    ///
    /// A timeout is distinct from a failed batch: the import may still be
    /// running on the destination when `WaitTimeout` is returned.
    pub async fn queue_import_and_wait(
        &self,
        kind: &str,
        request: &ImportQueueRequest,
    ) -> Result<ProgressUpdate> {
        let response = self.queue_import(kind, request).await?;
        self.wait_for_batch(kind, &response.batch_id).await
    }

    /// Poll one batch until it reaches a terminal status or the configured
    /// deadline passes
    pub async fn wait_for_batch(&self, kind: &str, batch_id: &str) -> Result<ProgressUpdate> {
        let deadline = Instant::now() + self.import.wait_timeout();

        loop {
            let update = self.get_status(kind, batch_id).await?;
            if update.status.is_terminal() {
                info!(
                    batch_id = %batch_id,
                    status = %update.status,
                    processed = update.processed_count,
                    errors = update.error_count,
                    "Import batch reached terminal status"
                );
                return Ok(update);
            }

            debug!(
                batch_id = %batch_id,
                status = %update.status,
                processed = update.processed_count,
                total = update.total_items,
                "Import batch still running"
            );

            if Instant::now() + self.import.poll_interval() > deadline {
                return Err(PublishError::wait_timeout(batch_id));
            }
            tokio::time::sleep(self.import.poll_interval()).await;
        }
    }

    /// Submit records in configured-size chunks, in input order.
    ///
    /// Each chunk is serialized to JSON, pushed through the blob publisher,
    /// and queued as its own import batch referencing the blob address.
    pub async fn submit_records(
        &self,
        blob: &BlobPublisher,
        kind: &str,
        records: &[ContentRecord],
    ) -> Result<Vec<ImportQueueResponse>> {
        for record in records {
            record.validate()?;
        }

        let chunk_size = self.import.chunk_size.max(1);
        let total_chunks = records.len().div_ceil(chunk_size);
        let mut responses = Vec::with_capacity(total_chunks);

        for (index, chunk) in records.chunks(chunk_size).enumerate() {
            let payload = serde_json::to_vec(chunk)?;
            let push = blob.push(&payload, None).await;
            if !push.success {
                return Err(PublishError::api(format!(
                    "failed to upload items blob for chunk {}/{}: {}",
                    index + 1,
                    total_chunks,
                    push.error.unwrap_or_else(|| "unknown error".to_string())
                )));
            }

            let request = ImportQueueRequest {
                batch_id: None,
                blob_address: push.digest.clone(),
                total_items: chunk.len() as u32,
                schema_version: 1,
                chunk_size: None,
                chunk_delay_ms: None,
            };

            let response = self.queue_import(kind, &request).await?;
            debug!(
                chunk = index + 1,
                total_chunks,
                batch_id = %response.batch_id,
                "Chunk submitted"
            );
            responses.push(response);
        }

        Ok(responses)
    }

    /// Bulk-write content records to the destination
    pub async fn bulk_write_content(&self, records: &[ContentRecord]) -> Result<BulkWriteResult> {
        let documents = records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.api.bulk_write(CONTENT_COLLECTION, &documents).await
    }

    /// Bulk-write path documents to the destination
    pub async fn bulk_write_paths(&self, paths: &[serde_json::Value]) -> Result<BulkWriteResult> {
        self.api.bulk_write(PATHS_COLLECTION, paths).await
    }

    /// Bulk-write relationship documents to the destination
    pub async fn bulk_write_relationships(
        &self,
        relationships: &[serde_json::Value],
    ) -> Result<BulkWriteResult> {
        self.api
            .bulk_write(RELATIONSHIPS_COLLECTION, relationships)
            .await
    }

    /// Poll the destination's status endpoint until it reports ready
    pub async fn await_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.api.get_status().await {
                Ok(status) if status.ready => return Ok(()),
                Ok(status) => {
                    debug!(
                        attempt = attempts,
                        message = status.message.as_deref().unwrap_or(""),
                        "Destination not ready yet"
                    );
                },
                Err(err) => {
                    debug!(attempt = attempts, error = %err, "Status poll failed");
                },
            }

            if Instant::now() + self.import.poll_interval() > deadline {
                return Err(PublishError::NotReadyAfterRetries { attempts });
            }
            tokio::time::sleep(self.import.poll_interval()).await;
        }
    }

    fn synthetic_accept(&self, request: &ImportQueueRequest) -> ImportQueueResponse {
        let batch_id = request
            .batch_id
            .clone()
            .unwrap_or_else(|| format!("dry-run-{}", uuid::Uuid::new_v4()));
        ImportQueueResponse {
            batch_id,
            queued_count: request.total_items,
            processing: false,
            message: Some("dry run: batch not submitted".to_string()),
        }
    }
}
