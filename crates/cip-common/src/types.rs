//! Record model and wire types shared across the pipeline

use crate::error::{CipError, Result};
use serde::{Deserialize, Serialize};

/// Reference to a content body stored as a separate blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobReference {
    /// Legacy address form: `sha256-<hex>`
    pub digest: String,

    /// CIDv1 text form, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,

    /// Blob size in bytes
    pub size: u64,

    /// Entry point for compound content (e.g. "index.html" for an app zip)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,

    /// Fallback URL where the blob can also be fetched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,
}

/// A record body is either inline bytes or a reference to an uploaded blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RecordBody {
    /// Body carried inline with the metadata record
    Inline {
        #[serde(with = "body_bytes")]
        bytes: Vec<u8>,
    },
    /// Body stored separately, addressed by digest
    Blob(BlobReference),
}

/// Base64 transport for inline bodies, so records stay valid JSON even when
/// the body is binary.
mod body_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A unit of content to ingest.
///
/// Created by the caller before a run. The pipeline may annotate it in
/// place (adding a blob reference and clearing the inline body once
/// extraction happens); it is never mutated after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Stable caller-assigned identifier, unique within a run
    pub id: String,

    /// Declared format tag (e.g. "markdown", "html5-app", "video")
    pub format: String,

    /// Inline bytes or blob reference
    pub body: RecordBody,

    /// Opaque caller metadata, carried through unmodified
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ContentRecord {
    /// Create an inline record
    pub fn inline(id: impl Into<String>, format: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            format: format.into(),
            body: RecordBody::Inline { bytes },
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a record that already references an uploaded blob
    pub fn with_blob(
        id: impl Into<String>,
        format: impl Into<String>,
        blob: BlobReference,
    ) -> Self {
        Self {
            id: id.into(),
            format: format.into(),
            body: RecordBody::Blob(blob),
            metadata: serde_json::Map::new(),
        }
    }

    /// Check the record invariants: a blob record must carry a non-empty
    /// digest, an inline record a non-empty body.
    pub fn validate(&self) -> Result<()> {
        match &self.body {
            RecordBody::Blob(blob) if blob.digest.is_empty() => Err(CipError::invalid_record(
                &self.id,
                "blob record has an empty digest",
            )),
            RecordBody::Inline { bytes } if bytes.is_empty() => Err(CipError::invalid_record(
                &self.id,
                "inline record has an empty body",
            )),
            _ => Ok(()),
        }
    }

    /// Size of the extractable body, if any
    pub fn body_size(&self) -> u64 {
        match &self.body {
            RecordBody::Inline { bytes } => bytes.len() as u64,
            RecordBody::Blob(blob) => blob.size,
        }
    }

    /// Whether this record already references a blob
    pub fn has_blob_reference(&self) -> bool {
        matches!(self.body, RecordBody::Blob(_))
    }

    /// Replace the inline body with a blob reference after extraction
    pub fn attach_blob(&mut self, blob: BlobReference) {
        self.body = RecordBody::Blob(blob);
    }
}

/// Outcome of one blob-publish attempt. Produced once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobPushResult {
    pub digest: String,
    pub cid: String,
    pub success: bool,
    pub already_existed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BlobPushResult {
    pub fn pushed(digest: String, cid: String) -> Self {
        Self {
            digest,
            cid,
            success: true,
            already_existed: false,
            error: None,
        }
    }

    pub fn skipped(digest: String, cid: String) -> Self {
        Self {
            digest,
            cid,
            success: true,
            already_existed: true,
            error: None,
        }
    }

    pub fn failed(digest: String, cid: String, error: impl Into<String>) -> Self {
        Self {
            digest,
            cid,
            success: false,
            already_existed: false,
            error: Some(error.into()),
        }
    }
}

/// Server-reported state of an import batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Queued,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl ImportStatus {
    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportStatus::Completed | ImportStatus::CompletedWithErrors | ImportStatus::Failed
        )
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImportStatus::Queued => "queued",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::CompletedWithErrors => "completed_with_errors",
            ImportStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Point-in-time snapshot of one batch's progress.
///
/// Later updates supersede earlier ones for the same batch id; each update
/// is the authoritative latest state, not a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub batch_id: String,
    pub status: ImportStatus,
    pub total_items: u32,
    pub processed_count: u32,
    pub error_count: u32,
    /// First few human-readable error strings
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput_per_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
}

/// Request to queue an import batch.
///
/// The items blob must be uploaded first; the queue call carries only the
/// blob address and counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportQueueRequest {
    /// Batch identifier (generated server-side when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Address of the uploaded blob holding the serialized items
    pub blob_address: String,
    /// Total number of items in the blob
    pub total_items: u32,
    /// Schema version for the import payload
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Items per server-side chunk (server default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    /// Delay between chunks in ms (server default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_delay_ms: Option<u64>,
}

fn default_schema_version() -> u32 {
    1
}

/// Response from queuing an import batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportQueueResponse {
    pub batch_id: String,
    pub queued_count: u32,
    pub processing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of a bulk write to one destination collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkWriteResult {
    pub inserted: u64,
    pub skipped: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}
