//! Blob extraction policy
//!
//! Decides whether a record's body travels inline with its metadata or is
//! extracted to the blob store and replaced by a reference.

use crate::types::ContentRecord;
use std::collections::HashSet;
use tracing::warn;

/// Default minimum body size for extraction, in bytes
pub const DEFAULT_MIN_BLOB_BYTES: u64 = 256 * 1024;

/// How a record's body should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Body stays inline with the metadata record
    Inline,
    /// Body is uploaded to the blob store and replaced by a reference
    Extract,
}

/// Policy deciding which record bodies get extracted to blob storage.
///
/// A record is extracted iff its format is eligible, it does not already
/// reference a blob, and its body meets the size threshold. Exactly at the
/// threshold counts as extract.
#[derive(Debug, Clone)]
pub struct ExtractionPolicy {
    /// Format tags eligible for extraction
    pub eligible_formats: HashSet<String>,
    /// Minimum body size in bytes
    pub min_blob_bytes: u64,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self {
            eligible_formats: ["html5-app", "video", "audio", "pdf", "archive"]
                .into_iter()
                .map(String::from)
                .collect(),
            min_blob_bytes: DEFAULT_MIN_BLOB_BYTES,
        }
    }
}

impl ExtractionPolicy {
    /// Policy with the given eligible formats and size threshold
    pub fn new(eligible_formats: impl IntoIterator<Item = String>, min_blob_bytes: u64) -> Self {
        Self {
            eligible_formats: eligible_formats.into_iter().collect(),
            min_blob_bytes,
        }
    }

    /// Classify one record.
    ///
    /// Records that already carry a blob reference are never re-extracted.
    /// An eligible record whose inline body is empty cannot be materialized
    /// as a blob; it falls back to Inline with a warning rather than failing
    /// the run.
    pub fn classify(&self, record: &ContentRecord) -> Disposition {
        if record.has_blob_reference() {
            return Disposition::Inline;
        }
        if !self.eligible_formats.contains(&record.format) {
            return Disposition::Inline;
        }
        let size = record.body_size();
        if size == 0 {
            warn!(
                record_id = %record.id,
                format = %record.format,
                "Record format is extraction-eligible but has no body bytes; keeping inline"
            );
            return Disposition::Inline;
        }
        if size >= self.min_blob_bytes {
            Disposition::Extract
        } else {
            Disposition::Inline
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{BlobReference, ContentRecord};

    fn policy() -> ExtractionPolicy {
        ExtractionPolicy::new(["video".to_string()], 1024)
    }

    #[test]
    fn test_extract_at_exact_threshold() {
        let record = ContentRecord::inline("r1", "video", vec![0u8; 1024]);
        assert_eq!(policy().classify(&record), Disposition::Extract);
    }

    #[test]
    fn test_inline_below_threshold() {
        let record = ContentRecord::inline("r2", "video", vec![0u8; 1023]);
        assert_eq!(policy().classify(&record), Disposition::Inline);
    }

    #[test]
    fn test_ineligible_format_stays_inline() {
        let record = ContentRecord::inline("r3", "markdown", vec![0u8; 4096]);
        assert_eq!(policy().classify(&record), Disposition::Inline);
    }

    #[test]
    fn test_existing_blob_reference_not_reextracted() {
        let record = ContentRecord::with_blob(
            "r4",
            "video",
            BlobReference {
                digest: "sha256-abc".to_string(),
                cid: None,
                size: 1_000_000,
                entry_point: None,
                fallback_url: None,
            },
        );
        assert_eq!(policy().classify(&record), Disposition::Inline);
    }

    #[test]
    fn test_empty_body_falls_back_to_inline() {
        let record = ContentRecord::inline("r5", "video", Vec::new());
        assert_eq!(policy().classify(&record), Disposition::Inline);
    }
}
