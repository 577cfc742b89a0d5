//! Idempotent blob publishing
//!
//! Uploads content-addressed blobs to the blob store, skipping anything the
//! store (or the local cache) already has. Pushing the same bytes twice is
//! always safe: the address is the digest, so a second push either hits the
//! cache, hits the store's existence probe, or overwrites with identical
//! bytes.

pub mod cache;

use crate::api::endpoints;
use crate::config::PublishConfig;
use crate::error::Result;
use cache::BlobCache;
use cip_common::types::{BlobPushResult, BlobReference};
use cip_common::ContentDigest;
use reqwest::Client;
use tracing::{debug, info, warn};

/// Aggregate outcome of a sequential batch of pushes
#[derive(Debug, Default)]
pub struct BlobBatchReport {
    pub pushed: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Error strings for the failed items, in input order
    pub errors: Vec<String>,
    /// Per-item results, in input order
    pub results: Vec<BlobPushResult>,
}

impl BlobBatchReport {
    fn record(&mut self, result: BlobPushResult) {
        if !result.success {
            self.failed += 1;
            if let Some(ref err) = result.error {
                self.errors.push(format!("{}: {}", result.digest, err));
            }
        } else if result.already_existed {
            self.skipped += 1;
        } else {
            self.pushed += 1;
        }
        self.results.push(result);
    }
}

/// Publishes blobs to the blob store, with a local content-addressed cache
pub struct BlobPublisher {
    client: Client,
    blob_store_url: String,
    cache: BlobCache,
    dry_run: bool,
}

impl BlobPublisher {
    /// Create a publisher from pipeline configuration
    pub fn new(config: &PublishConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.api_timeout()).build()?;
        let cache = BlobCache::open(&config.cache_dir)?;

        Ok(Self {
            client,
            blob_store_url: config.blob_store_url.clone(),
            cache,
            dry_run: config.dry_run,
        })
    }

    /// Probe whether the store already holds a blob at this address.
    ///
    /// Existence is an optimization only, so transport errors report
    /// `false` and the caller proceeds to upload.
    pub async fn exists(&self, address: &str) -> bool {
        let url = endpoints::blob_url(&self.blob_store_url, address);

        match self.client.head(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(address = %address, error = %err, "Existence probe failed; assuming absent");
                false
            },
        }
    }

    /// Push one blob, skipping the upload when it already exists.
    ///
    /// The digest is computed from the bytes; a declared reference whose
    /// digest disagrees with the bytes fails the item rather than uploading
    /// mislabeled content. Failures are reported in the result, never as
    /// `Err`.
    pub async fn push(&self, data: &[u8], declared: Option<&BlobReference>) -> BlobPushResult {
        let digest = ContentDigest::from_bytes(data);
        let cid = digest.cid();
        let legacy = digest.legacy();

        if let Some(blob_ref) = declared {
            if let Ok(declared_digest) = ContentDigest::parse(&blob_ref.digest) {
                if declared_digest != digest {
                    return BlobPushResult::failed(
                        legacy,
                        cid,
                        format!(
                            "declared digest {} does not match content digest {}",
                            blob_ref.digest,
                            digest.legacy()
                        ),
                    );
                }
            }
        }

        if self.dry_run {
            debug!(digest = %legacy, bytes = data.len(), "Dry run: skipping blob upload");
            self.cache_quietly(&digest, data);
            return BlobPushResult::pushed(legacy, cid);
        }

        if self.cache.contains(&digest) {
            debug!(digest = %legacy, "Blob cache hit; skipping upload");
            return BlobPushResult::skipped(legacy, cid);
        }

        // The store may know the blob under either address scheme
        if self.exists(&cid).await || self.exists(&legacy).await {
            debug!(digest = %legacy, "Blob already in store; skipping upload");
            self.cache_quietly(&digest, data);
            return BlobPushResult::skipped(legacy, cid);
        }

        match self.upload(&cid, data, declared).await {
            Ok(()) => {
                info!(digest = %legacy, cid = %cid, bytes = data.len(), "Blob pushed");
                self.cache_quietly(&digest, data);
                BlobPushResult::pushed(legacy, cid)
            },
            Err(err) => BlobPushResult::failed(legacy, cid, err.to_string()),
        }
    }

    /// Push a batch strictly sequentially, collecting per-item failures
    /// without aborting the rest.
    pub async fn push_batch(&self, items: &[(Vec<u8>, Option<BlobReference>)]) -> BlobBatchReport {
        let mut report = BlobBatchReport::default();

        for (data, declared) in items {
            let result = self.push(data, declared.as_ref()).await;
            report.record(result);
        }

        info!(
            pushed = report.pushed,
            skipped = report.skipped,
            failed = report.failed,
            "Blob batch finished"
        );
        report
    }

    async fn upload(
        &self,
        cid: &str,
        data: &[u8],
        declared: Option<&BlobReference>,
    ) -> Result<()> {
        let url = endpoints::blob_url(&self.blob_store_url, cid);

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(reqwest::header::CONTENT_LENGTH, data.len());

        if let Some(blob_ref) = declared {
            if let Some(ref entry_point) = blob_ref.entry_point {
                request = request.header("X-Entry-Point", entry_point);
            }
            if let Some(ref fallback_url) = blob_ref.fallback_url {
                request = request.header("X-Fallback-Url", fallback_url);
            }
        }

        request
            .body(data.to_vec())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn cache_quietly(&self, digest: &ContentDigest, data: &[u8]) {
        if let Err(err) = self.cache.store(digest, data) {
            warn!(digest = %digest, error = %err, "Failed to cache blob locally");
        }
    }
}
