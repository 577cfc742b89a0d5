//! Wire types for the destination API

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response from `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Response from `GET /status`: readiness plus per-collection document counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Whether the destination is ready to accept imports
    pub ready: bool,

    /// Document count per collection
    #[serde(default)]
    pub counts: HashMap<String, u64>,

    /// Optional human-readable detail (e.g. what is still warming up)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
