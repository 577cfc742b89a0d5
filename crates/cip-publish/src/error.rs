//! Error types for the publish pipeline
//!
//! Errors distinguish transient network failures (retryable), destination
//! rejections (caller must act), and local failures. Per-item failures inside
//! a batch are collected as data in the batch result, never surfaced as an
//! `Err` for the whole batch.

use thiserror::Error;

/// Result type alias for publish operations
pub type Result<T> = std::result::Result<T, PublishError>;

/// Comprehensive error type for publish operations
#[derive(Error, Debug)]
pub enum PublishError {
    /// HTTP transport failed; usually transient
    #[error("Network request failed: {0}. Check your connection and the destination URL.")]
    Http(#[from] reqwest::Error),

    /// Destination kept responding 503 through every allowed retry
    #[error("Destination still not ready after {attempts} attempts. It may still be starting up; retry later or raise the retry limit.")]
    NotReadyAfterRetries { attempts: u32 },

    /// Import batch unknown to the destination
    #[error("Import batch '{batch_id}' not found. It may have expired or was never queued.")]
    BatchNotFound { batch_id: String },

    /// Waiting for a batch hit the deadline; the batch may still be running
    #[error("Timed out waiting for batch '{batch_id}' to complete. The import may still be running; check its status later.")]
    WaitTimeout { batch_id: String },

    /// Progress channel was closed while a caller was waiting on it
    #[error("Progress channel closed while waiting for batch '{batch_id}'.")]
    ChannelClosed { batch_id: String },

    /// Reconnect attempts on the progress channel were exhausted
    #[error("Progress channel gave up after {attempts} reconnect attempts. Falling back to polling is available via poll_batch_to_completion.")]
    ReconnectExhausted { attempts: u32 },

    /// A pre-flight check failed, so no writes were attempted
    #[error("Pre-flight verification failed: {0}. No data was written.")]
    PreflightFailed(String),

    /// Destination accepted the request but rejected its content
    #[error("Destination error: {0}")]
    Api(String),

    /// Content addressing or record validation failed
    #[error(transparent)]
    Content(#[from] cip_common::CipError),

    /// JSON encode/decode failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local file system operation failed
    #[error("File operation failed: {0}. Check permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables or config.")]
    Config(String),
}

impl PublishError {
    /// Create a destination error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a batch-not-found error
    pub fn batch_not_found(batch_id: impl Into<String>) -> Self {
        Self::BatchNotFound {
            batch_id: batch_id.into(),
        }
    }

    /// Create a wait-timeout error
    pub fn wait_timeout(batch_id: impl Into<String>) -> Self {
        Self::WaitTimeout {
            batch_id: batch_id.into(),
        }
    }

    /// Whether retrying the same call might succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PublishError::Http(_)
                | PublishError::NotReadyAfterRetries { .. }
                | PublishError::WaitTimeout { .. }
        )
    }
}
