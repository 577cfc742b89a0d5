//! Pre-flight and post-flight ingestion verification
//!
//! Pre-flight proves the destination is reachable and writable before any
//! real data moves; post-flight compares what the destination reports
//! against what the run submitted. Warnings surface in the results but only
//! a failed check blocks.

use crate::api::ApiClient;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Maximum submitted ids re-fetched during the post-flight sample check
pub const MAX_SAMPLE_IDS: usize = 10;

/// Prefix marking throwaway pre-flight records so destinations can
/// garbage-collect them
pub const PREFLIGHT_ID_PREFIX: &str = "cip-preflight-";

/// Outcome of one verification check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// One named verification check and its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<u64>,
}

impl VerificationCheck {
    fn new(name: impl Into<String>, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    fn with_counts(mut self, expected: u64, actual: u64) -> Self {
        self.expected = Some(expected);
        self.actual = Some(actual);
        self
    }
}

/// Aggregated pre-flight outcome, including the count baseline the
/// post-flight delta is computed against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightResult {
    pub checks: Vec<VerificationCheck>,
    pub baseline_counts: HashMap<String, u64>,
}

impl PreflightResult {
    /// True when no check failed; warnings do not block
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }

    /// Summary of failed checks for error messages
    pub fn failure_summary(&self) -> String {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .map(|c| format!("{}: {}", c.name, c.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Aggregated post-flight outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostflightResult {
    pub checks: Vec<VerificationCheck>,
}

impl PostflightResult {
    /// True when no check failed; warnings do not block
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }
}

/// Runs the verification checks against the destination
pub struct IngestionVerifier<'a> {
    api: &'a ApiClient,
}

impl<'a> IngestionVerifier<'a> {
    pub fn new(api: &'a ApiClient) -> Self {
        Self { api }
    }

    /// Run the pre-flight checks: connectivity, count baseline, and a
    /// synthetic write-read-back.
    ///
    /// A destination that rejects the synthetic record as already existing
    /// still proves writability, so that rejection counts as a pass.
    pub async fn preflight(&self) -> Result<PreflightResult> {
        let mut checks = Vec::new();
        let mut baseline_counts = HashMap::new();

        let healthy = self.api.health_check().await?;
        if !healthy {
            checks.push(VerificationCheck::new(
                "connectivity",
                CheckStatus::Fail,
                format!("destination at {} is unreachable", self.api.base_url()),
            ));
            // Nothing else is meaningful without connectivity
            return Ok(PreflightResult {
                checks,
                baseline_counts,
            });
        }
        checks.push(VerificationCheck::new(
            "connectivity",
            CheckStatus::Pass,
            "destination is healthy",
        ));

        match self.api.get_status().await {
            Ok(status) => {
                baseline_counts = status.counts;
                checks.push(VerificationCheck::new(
                    "baseline_counts",
                    CheckStatus::Pass,
                    format!("captured counts for {} collections", baseline_counts.len()),
                ));
            },
            Err(err) => {
                checks.push(VerificationCheck::new(
                    "baseline_counts",
                    CheckStatus::Fail,
                    format!("could not read destination status: {}", err),
                ));
            },
        }

        checks.push(self.synthetic_write_read_back().await);

        let result = PreflightResult {
            checks,
            baseline_counts,
        };
        if result.passed() {
            info!("Pre-flight verification passed");
        } else {
            warn!(failures = %result.failure_summary(), "Pre-flight verification failed");
        }
        Ok(result)
    }

    async fn synthetic_write_read_back(&self) -> VerificationCheck {
        let id = format!("{}{}", PREFLIGHT_ID_PREFIX, uuid::Uuid::new_v4());
        let document = serde_json::json!({
            "id": id,
            "format": "preflight-marker",
            "body": { "mode": "inline", "bytes": "cA==" },
        });

        let write = match self.api.bulk_write("content", &[document]).await {
            Ok(result) => result,
            Err(err) => {
                return VerificationCheck::new(
                    "synthetic_write",
                    CheckStatus::Fail,
                    format!("synthetic write failed: {}", err),
                );
            },
        };

        let accepted = write.inserted + write.skipped > 0;
        let already_exists = write
            .errors
            .iter()
            .any(|e| e.to_lowercase().contains("already exists"));
        if !accepted && !already_exists {
            return VerificationCheck::new(
                "synthetic_write",
                CheckStatus::Fail,
                format!(
                    "destination acknowledged no writes: {}",
                    write.errors.join("; ")
                ),
            );
        }
        if already_exists {
            // Rejection for duplication still proves the write path works
            return VerificationCheck::new(
                "synthetic_write",
                CheckStatus::Pass,
                "destination rejected duplicate synthetic record; write path works",
            );
        }

        match self.api.fetch_content(&id).await {
            Ok(Some(_)) => VerificationCheck::new(
                "synthetic_write",
                CheckStatus::Pass,
                "synthetic record written and read back",
            ),
            Ok(None) => VerificationCheck::new(
                "synthetic_write",
                CheckStatus::Fail,
                "synthetic record was accepted but could not be read back",
            ),
            Err(err) => VerificationCheck::new(
                "synthetic_write",
                CheckStatus::Fail,
                format!("synthetic read-back failed: {}", err),
            ),
        }
    }

    /// Run the post-flight checks: per-collection count deltas against the
    /// pre-flight baseline and a sample-existence probe of submitted ids.
    pub async fn postflight(
        &self,
        baseline_counts: &HashMap<String, u64>,
        expected_new: &HashMap<String, u64>,
        submitted_ids: &[String],
    ) -> Result<PostflightResult> {
        let mut checks = Vec::new();

        let current = self.api.get_status().await?.counts;

        for (collection, &expected) in expected_new {
            let before = baseline_counts.get(collection).copied().unwrap_or(0);
            let after = current.get(collection).copied().unwrap_or(0);
            let delta = after.saturating_sub(before);

            let check = if expected == 0 {
                VerificationCheck::new(
                    format!("count_delta:{}", collection),
                    CheckStatus::Pass,
                    "nothing expected",
                )
            } else if delta == 0 {
                VerificationCheck::new(
                    format!("count_delta:{}", collection),
                    CheckStatus::Fail,
                    format!("expected {} new documents, destination shows none", expected),
                )
            } else if delta < expected {
                VerificationCheck::new(
                    format!("count_delta:{}", collection),
                    CheckStatus::Warn,
                    format!("expected {} new documents, destination shows {}", expected, delta),
                )
            } else {
                VerificationCheck::new(
                    format!("count_delta:{}", collection),
                    CheckStatus::Pass,
                    format!("{} new documents", delta),
                )
            };
            checks.push(check.with_counts(expected, delta));
        }

        if !submitted_ids.is_empty() {
            checks.push(self.sample_existence(submitted_ids).await);
        }

        let result = PostflightResult { checks };
        if result.passed() {
            info!("Post-flight verification passed");
        } else {
            warn!("Post-flight verification failed");
        }
        Ok(result)
    }

    async fn sample_existence(&self, submitted_ids: &[String]) -> VerificationCheck {
        let sample: Vec<&String> = submitted_ids.iter().take(MAX_SAMPLE_IDS).collect();
        let mut found: u64 = 0;

        for id in &sample {
            match self.api.fetch_content(id).await {
                Ok(Some(_)) => found += 1,
                Ok(None) => {},
                Err(err) => {
                    warn!(id = %id, error = %err, "Sample fetch failed");
                },
            }
        }

        let total = sample.len() as u64;
        let check = if found == 0 {
            VerificationCheck::new(
                "sample_existence",
                CheckStatus::Fail,
                format!("none of {} sampled records found", total),
            )
        } else if found < total {
            VerificationCheck::new(
                "sample_existence",
                CheckStatus::Warn,
                format!("{} of {} sampled records found", found, total),
            )
        } else {
            VerificationCheck::new(
                "sample_existence",
                CheckStatus::Pass,
                format!("all {} sampled records found", total),
            )
        };
        check.with_counts(total, found)
    }
}
