//! CIP Publish Pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Client-side ingestion pipeline that dual-writes content: metadata
//! records go to the destination's import API, large bodies go to a
//! content-addressed blob store.
//!
//! # Overview
//!
//! - **blob**: idempotent blob publishing with a local content-addressed
//!   cache
//! - **import**: chunked batch submission with not-ready retries and
//!   status polling
//! - **progress**: live WebSocket progress with reconnects, plus a polling
//!   fallback
//! - **verify**: pre-flight and post-flight destination checks
//! - **pipeline**: the end-to-end runner producing an [`IngestReport`]
//!
//! # Example
//!
//! ```no_run
//! use cip_publish::{IngestPipeline, PublishConfig};
//! use cip_common::ContentRecord;
//!
//! # async fn run() -> cip_publish::Result<()> {
//! let config = PublishConfig::from_env()?;
//! let pipeline = IngestPipeline::new(config)?;
//!
//! let records = vec![ContentRecord::inline("lesson-1", "markdown", b"# Hi".to_vec())];
//! let report = pipeline.run("content", records).await?;
//! println!("verdict: {:?}", report.verdict);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod blob;
pub mod config;
pub mod error;
pub mod import;
pub mod pipeline;
pub mod progress;
pub mod verify;

// Re-export the main entry points
pub use api::ApiClient;
pub use blob::{BlobBatchReport, BlobPublisher};
pub use config::{ImportConfig, ProgressConfig, PublishConfig, RetryConfig};
pub use error::{PublishError, Result};
pub use import::ImportOrchestrator;
pub use pipeline::{IngestPipeline, IngestReport, Verdict};
pub use progress::{
    poll_batch_to_completion, ChannelEvent, ChannelState, NullObserver, ProgressChannel,
    ProgressObserver,
};
pub use verify::{CheckStatus, IngestionVerifier, PostflightResult, PreflightResult};
