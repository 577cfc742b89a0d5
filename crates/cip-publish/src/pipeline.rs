//! End-to-end ingestion pipeline
//!
//! Runs the full dual-write flow: classify records, extract large bodies to
//! the blob store, verify the destination, submit import batches, wait for
//! them to finish, and verify what landed. The caller gets one report with
//! an explicit verdict.

use crate::blob::BlobPublisher;
use crate::config::PublishConfig;
use crate::error::{PublishError, Result};
use crate::import::ImportOrchestrator;
use crate::progress::{
    poll_batch_to_completion, NullObserver, ProgressChannel, ProgressObserver,
};
use crate::verify::{IngestionVerifier, PostflightResult, PreflightResult};
use crate::api::endpoints;
use chrono::{DateTime, Utc};
use cip_common::types::{BlobReference, ContentRecord, ImportStatus};
use cip_common::{ContentDigest, Disposition, ExtractionPolicy, RecordBody};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Maximum error strings carried in the report
const MAX_ERROR_SAMPLES: usize = 10;

/// Maximum length of one reported error string
const MAX_ERROR_LEN: usize = 300;

/// Overall run outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Everything submitted landed and verified
    Success,
    /// The run finished but some items failed or verification warned
    Partial,
    /// The run did not deliver what was submitted
    Failed,
}

/// Terminal summary of one import batch
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: String,
    pub status: ImportStatus,
    pub processed_count: u32,
    pub error_count: u32,
}

/// Final report of one pipeline run
#[derive(Debug)]
pub struct IngestReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub blobs_pushed: u64,
    pub blobs_skipped: u64,
    pub blobs_failed: u64,
    pub batches: Vec<BatchSummary>,
    pub preflight: Option<PreflightResult>,
    pub postflight: Option<PostflightResult>,
    /// Truncated sample of error strings, at most [`MAX_ERROR_SAMPLES`]
    pub errors: Vec<String>,
    pub verdict: Verdict,
}

/// The assembled pipeline
pub struct IngestPipeline {
    config: PublishConfig,
    policy: ExtractionPolicy,
    blob: BlobPublisher,
    orchestrator: ImportOrchestrator,
    observer: Arc<dyn ProgressObserver>,
}

impl IngestPipeline {
    /// Build a pipeline from configuration with the default extraction
    /// policy
    pub fn new(config: PublishConfig) -> Result<Self> {
        Self::with_policy(config, ExtractionPolicy::default())
    }

    /// Build a pipeline with an explicit extraction policy
    pub fn with_policy(config: PublishConfig, policy: ExtractionPolicy) -> Result<Self> {
        let blob = BlobPublisher::new(&config)?;
        let orchestrator = ImportOrchestrator::from_config(&config)?;
        Ok(Self {
            config,
            policy,
            blob,
            orchestrator,
            observer: Arc::new(NullObserver),
        })
    }

    /// Attach an observer receiving progress callbacks during the run
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run the full ingestion flow for one set of records.
    ///
    /// A failed pre-flight aborts with `PreflightFailed` before anything is
    /// written. Per-record failures do not abort the run; they are counted
    /// and sampled in the report.
    pub async fn run(&self, kind: &str, mut records: Vec<ContentRecord>) -> Result<IngestReport> {
        let started_at = Utc::now();
        let attempted = records.len() as u64;
        let mut errors = ErrorSample::default();

        info!(kind = %kind, records = attempted, dry_run = self.config.dry_run, "Ingestion run started");

        // Prove the destination is reachable and writable before the run
        // writes anywhere, the blob store included
        let preflight = if self.config.dry_run {
            None
        } else {
            let result = IngestionVerifier::new(self.orchestrator.api()).preflight().await?;
            if !result.passed() {
                return Err(PublishError::PreflightFailed(result.failure_summary()));
            }
            Some(result)
        };

        // Extract eligible bodies to the blob store, annotating records in
        // place
        let (blobs_pushed, blobs_skipped, blobs_failed) =
            self.extract_blobs(&mut records, &mut errors).await;

        let responses = self
            .orchestrator
            .submit_records(&self.blob, kind, &records)
            .await?;

        let batches = if self.config.dry_run {
            Vec::new()
        } else {
            self.await_batches(kind, &responses, &mut errors).await
        };

        let postflight = match &preflight {
            Some(pre) => {
                let expected_new =
                    HashMap::from([("content".to_string(), records.len() as u64)]);
                let submitted_ids: Vec<String> =
                    records.iter().map(|r| r.id.clone()).collect();
                Some(
                    IngestionVerifier::new(self.orchestrator.api())
                        .postflight(&pre.baseline_counts, &expected_new, &submitted_ids)
                        .await?,
                )
            },
            None => None,
        };

        let batch_errors: u64 = batches.iter().map(|b| u64::from(b.error_count)).sum();
        let batch_failed = batches.iter().any(|b| b.status == ImportStatus::Failed);
        let succeeded: u64 = if self.config.dry_run {
            records.len() as u64
        } else {
            batches.iter().map(|b| u64::from(b.processed_count)).sum()
        };
        let failed = blobs_failed + batch_errors;

        let postflight_failed = postflight.as_ref().is_some_and(|p| !p.passed());
        let postflight_warned = postflight
            .as_ref()
            .is_some_and(|p| p.checks.iter().any(|c| c.status == crate::verify::CheckStatus::Warn));

        let verdict = if batch_failed || postflight_failed || (succeeded == 0 && attempted > 0 && !self.config.dry_run)
        {
            Verdict::Failed
        } else if failed > 0 || postflight_warned {
            Verdict::Partial
        } else {
            Verdict::Success
        };

        let report = IngestReport {
            started_at,
            finished_at: Utc::now(),
            attempted,
            succeeded,
            failed,
            blobs_pushed,
            blobs_skipped,
            blobs_failed,
            batches,
            preflight,
            postflight,
            errors: errors.into_vec(),
            verdict,
        };

        info!(
            verdict = ?report.verdict,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Ingestion run finished"
        );
        Ok(report)
    }

    async fn extract_blobs(
        &self,
        records: &mut [ContentRecord],
        errors: &mut ErrorSample,
    ) -> (u64, u64, u64) {
        let mut pushed = 0;
        let mut skipped = 0;
        let mut failed = 0;

        for record in records.iter_mut() {
            // A record arriving with a reference means its blob already
            // lives in the store; count it as skipped, attempt nothing
            if record.has_blob_reference() {
                skipped += 1;
                continue;
            }
            if self.policy.classify(record) != Disposition::Extract {
                continue;
            }
            let bytes = match &record.body {
                RecordBody::Inline { bytes } => bytes.clone(),
                RecordBody::Blob(_) => continue,
            };

            let result = self.blob.push(&bytes, None).await;
            if !result.success {
                failed += 1;
                errors.push(format!(
                    "record '{}': blob push failed: {}",
                    record.id,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
                continue;
            }
            if result.already_existed {
                skipped += 1;
            } else {
                pushed += 1;
            }

            let digest = ContentDigest::from_bytes(&bytes);
            record.attach_blob(BlobReference {
                digest: result.digest,
                cid: Some(digest.cid()),
                size: bytes.len() as u64,
                entry_point: None,
                fallback_url: None,
            });
        }

        (pushed, skipped, failed)
    }

    async fn await_batches(
        &self,
        kind: &str,
        responses: &[cip_common::types::ImportQueueResponse],
        errors: &mut ErrorSample,
    ) -> Vec<BatchSummary> {
        let ws_url = endpoints::progress_ws_url(&self.config.destination_url);
        let channel = ProgressChannel::connect(
            ws_url,
            self.config.progress.clone(),
            Arc::clone(&self.observer),
        );
        let timeout = self.config.import.wait_timeout();
        let mut summaries = Vec::with_capacity(responses.len());
        let mut channel_usable = true;

        for response in responses {
            let batch_id = &response.batch_id;
            let update = if channel_usable {
                match channel.wait_for_batch_completion(batch_id, timeout).await {
                    Ok(update) => Ok(update),
                    Err(
                        PublishError::ChannelClosed { .. }
                        | PublishError::ReconnectExhausted { .. },
                    ) => {
                        warn!(batch_id = %batch_id, "Progress channel unavailable; polling instead");
                        channel_usable = false;
                        self.poll_batch(kind, batch_id).await
                    },
                    Err(err) => Err(err),
                }
            } else {
                self.poll_batch(kind, batch_id).await
            };

            match update {
                Ok(update) => {
                    for error in &update.errors {
                        errors.push(format!("batch '{}': {}", batch_id, error));
                    }
                    summaries.push(BatchSummary {
                        batch_id: update.batch_id,
                        status: update.status,
                        processed_count: update.processed_count,
                        error_count: update.error_count,
                    });
                },
                Err(err) => {
                    errors.push(format!("batch '{}': {}", batch_id, err));
                    summaries.push(BatchSummary {
                        batch_id: batch_id.clone(),
                        status: ImportStatus::Failed,
                        processed_count: 0,
                        error_count: 0,
                    });
                },
            }
        }

        channel.close();
        summaries
    }

    async fn poll_batch(
        &self,
        kind: &str,
        batch_id: &str,
    ) -> Result<cip_common::types::ProgressUpdate> {
        poll_batch_to_completion(
            &self.orchestrator,
            kind,
            batch_id,
            self.config.import.poll_interval(),
            self.config.import.wait_timeout(),
            self.observer.as_ref(),
        )
        .await
    }
}

/// Bounded, truncated error sample for human consumption
#[derive(Default)]
struct ErrorSample {
    errors: Vec<String>,
    dropped: u64,
}

impl ErrorSample {
    fn push(&mut self, error: String) {
        if self.errors.len() < MAX_ERROR_SAMPLES {
            self.errors.push(truncate(&error, MAX_ERROR_LEN));
        } else {
            self.dropped += 1;
        }
    }

    fn into_vec(mut self) -> Vec<String> {
        if self.dropped > 0 {
            self.errors
                .push(format!("... and {} more errors", self.dropped));
        }
        self.errors
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
