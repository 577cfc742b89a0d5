//! Progress channel wire protocol
//!
//! JSON-framed messages tagged on `type`. The client sends subscription
//! management messages; the server streams batch progress. Unknown server
//! fields are ignored so the destination can add fields without breaking
//! older clients.

use cip_common::types::ProgressUpdate;
use serde::{Deserialize, Serialize};

/// Messages sent by this client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving updates for these batches
    Subscribe { batch_ids: Vec<String> },
    /// Stop receiving updates for these batches
    Unsubscribe { batch_ids: Vec<String> },
    /// Application-level keepalive
    Ping,
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authoritative latest state for one batch
    Progress {
        #[serde(flatten)]
        update: ProgressUpdate,
    },
    /// Batch reached a terminal status
    Complete {
        #[serde(flatten)]
        update: ProgressUpdate,
    },
    /// Channel or batch error
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_id: Option<String>,
        message: String,
    },
    /// Server keepalive
    Heartbeat,
    /// Snapshot of all known batches, sent on each (re)connect
    InitialState { batches: Vec<ProgressUpdate> },
}
