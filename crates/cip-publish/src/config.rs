//! Configuration for the publish pipeline
//!
//! All knobs live in explicit config structs handed to each component at
//! construction. Components never read the environment themselves;
//! `PublishConfig::from_env` is the single place environment variables are
//! consulted.

use crate::error::{PublishError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default metadata destination URL when not specified via environment.
pub const DEFAULT_DESTINATION_URL: &str = "http://localhost:8000";

/// Default blob store URL when not specified via environment.
pub const DEFAULT_BLOB_STORE_URL: &str = "http://localhost:8001";

/// Default timeout for API requests in seconds.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 300;

/// Default delay before retrying a 503 response without a Retry-After header.
pub const DEFAULT_NOT_READY_RETRY_SECS: u64 = 5;

/// Ceiling applied to server-supplied Retry-After values, in seconds.
pub const DEFAULT_RETRY_DELAY_CEILING_SECS: u64 = 30;

/// Default maximum number of retries while the destination reports not-ready.
pub const DEFAULT_MAX_NOT_READY_RETRIES: u32 = 10;

/// Default number of records per import chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Default deadline for waiting on one batch to complete.
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 600;

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Metadata destination base URL
    pub destination_url: String,

    /// Blob store base URL
    pub blob_store_url: String,

    /// Local blob cache directory
    pub cache_dir: PathBuf,

    /// HTTP request timeout in seconds
    pub api_timeout_secs: u64,

    /// When true, blob pushes report success without any network calls
    #[serde(default)]
    pub dry_run: bool,

    /// Retry behavior while the destination warms up
    #[serde(default)]
    pub retry: RetryConfig,

    /// Import chunking and polling behavior
    #[serde(default)]
    pub import: ImportConfig,

    /// Progress channel behavior
    #[serde(default)]
    pub progress: ProgressConfig,
}

/// Retry behavior for not-ready (503) responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay when the server sends no Retry-After header
    pub default_retry_delay_secs: u64,

    /// Upper bound applied to server-supplied Retry-After values
    pub retry_delay_ceiling_secs: u64,

    /// Maximum not-ready retries before giving up
    pub max_not_ready_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            default_retry_delay_secs: DEFAULT_NOT_READY_RETRY_SECS,
            retry_delay_ceiling_secs: DEFAULT_RETRY_DELAY_CEILING_SECS,
            max_not_ready_retries: DEFAULT_MAX_NOT_READY_RETRIES,
        }
    }
}

impl RetryConfig {
    /// Clamp a server-supplied delay to the configured ceiling
    pub fn clamp_delay(&self, retry_after_secs: u64) -> Duration {
        Duration::from_secs(retry_after_secs.min(self.retry_delay_ceiling_secs))
    }

    /// Delay to use when the server gave no hint
    pub fn default_delay(&self) -> Duration {
        Duration::from_secs(self.default_retry_delay_secs)
    }
}

/// Import submission and polling behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Records per submitted chunk
    pub chunk_size: usize,

    /// Interval between status polls
    pub poll_interval_secs: u64,

    /// Deadline for one batch to reach a terminal status
    pub wait_timeout_secs: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            wait_timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
        }
    }
}

impl ImportConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

/// Progress channel reconnect behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// First reconnect backoff in milliseconds; doubles per attempt
    pub initial_backoff_ms: u64,

    /// Backoff cap in milliseconds
    pub max_backoff_ms: u64,

    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: u32,

    /// Timeout for the WebSocket handshake in seconds
    pub connect_timeout_secs: u64,

    /// Interval between application-level keepalive pings in seconds
    pub ping_interval_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_reconnect_attempts: 8,
            connect_timeout_secs: 10,
            ping_interval_secs: 30,
        }
    }
}

impl ProgressConfig {
    /// Backoff for the nth reconnect attempt (0-based), exponential with cap
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_backoff_ms
            .saturating_mul(1u64 << attempt.min(32));
        Duration::from_millis(exp.min(self.max_backoff_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Keepalive ping interval, never zero
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            destination_url: DEFAULT_DESTINATION_URL.to_string(),
            blob_store_url: DEFAULT_BLOB_STORE_URL.to_string(),
            cache_dir: PathBuf::from(".cip-cache"),
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            dry_run: false,
            retry: RetryConfig::default(),
            import: ImportConfig::default(),
            progress: ProgressConfig::default(),
        }
    }
}

impl PublishConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from environment variables
    ///
    /// Environment variables:
    /// - `CIP_DESTINATION_URL`: Metadata destination base URL
    /// - `CIP_BLOB_STORE_URL`: Blob store base URL
    /// - `CIP_CACHE_DIR`: Local blob cache directory
    /// - `CIP_API_TIMEOUT_SECS`: HTTP request timeout
    /// - `CIP_DRY_RUN`: Skip blob uploads when "true"
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("CIP_DESTINATION_URL") {
            config.destination_url = url;
        }

        if let Ok(url) = std::env::var("CIP_BLOB_STORE_URL") {
            config.blob_store_url = url;
        }

        if let Ok(dir) = std::env::var("CIP_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }

        if let Ok(timeout) = std::env::var("CIP_API_TIMEOUT_SECS") {
            config.api_timeout_secs = timeout
                .parse()
                .map_err(|_| PublishError::config("CIP_API_TIMEOUT_SECS must be an integer"))?;
        }

        if let Ok(val) = std::env::var("CIP_DRY_RUN") {
            config.dry_run = val.eq_ignore_ascii_case("true") || val == "1";
        }

        Ok(config)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}
