//! End-to-end pipeline test: extract, verify, submit, wait, verify again

use cip_common::types::BlobReference;
use cip_common::{ContentRecord, ExtractionPolicy};
use cip_publish::{IngestPipeline, PublishConfig, Verdict};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn status_json(count: u64) -> serde_json::Value {
    serde_json::json!({"ready": true, "counts": {"content": count}})
}

#[tokio::test]
async fn test_full_run_with_extraction_and_verification() {
    let destination = MockServer::start().await;
    let blob_store = MockServer::start().await;
    let cache = TempDir::new().unwrap();

    // Destination: health, then a count baseline of 10 before the run and
    // 13 after it
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(&destination)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json(10)))
        .up_to_n_times(1)
        .mount(&destination)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json(13)))
        .mount(&destination)
        .await;

    // Pre-flight synthetic write and all read-backs succeed
    Mock::given(method("POST"))
        .and(path("/bulk/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "inserted": 1, "skipped": 0, "errors": [],
        })))
        .mount(&destination)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/content/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "x"})))
        .mount(&destination)
        .await;

    // One import batch, immediately completed
    Mock::given(method("POST"))
        .and(path("/import/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "batch_id": "b-e2e",
            "queued_count": 3,
            "processing": true,
        })))
        .expect(1)
        .mount(&destination)
        .await;
    Mock::given(method("GET"))
        .and(path("/import/content/b-e2e"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "batch_id": "b-e2e",
            "status": "completed",
            "total_items": 3,
            "processed_count": 3,
            "error_count": 0,
            "errors": [],
        })))
        .mount(&destination)
        .await;

    // Blob store: nothing exists yet, uploads succeed. Exactly two PUTs
    // may arrive: the extracted video body and the serialized chunk
    Mock::given(method("HEAD"))
        .and(path_regex("^/store/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&blob_store)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex("^/store/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&blob_store)
        .await;

    let mut config = PublishConfig::new();
    config.destination_url = destination.uri();
    config.blob_store_url = blob_store.uri();
    config.cache_dir = cache.path().to_path_buf();
    config.api_timeout_secs = 5;
    config.import.poll_interval_secs = 0;
    config.import.wait_timeout_secs = 10;
    // The destination serves no WebSocket, so fail over to polling fast
    config.progress.max_reconnect_attempts = 0;
    config.progress.initial_backoff_ms = 1;
    config.progress.connect_timeout_secs = 1;

    let policy = ExtractionPolicy::new(["video".to_string()], 1024);
    let pipeline = IngestPipeline::with_policy(config, policy).unwrap();

    let records = vec![
        ContentRecord::inline("lesson-1", "markdown", b"# Small inline lesson".to_vec()),
        ContentRecord::inline("clip-1", "video", vec![7u8; 20 * 1024]),
        ContentRecord::with_blob(
            "app-1",
            "html5-app",
            BlobReference {
                digest: "sha256-0000000000000000000000000000000000000000000000000000000000000000"
                    .to_string(),
                cid: None,
                size: 1_000_000,
                entry_point: Some("index.html".to_string()),
                fallback_url: None,
            },
        ),
    ];

    let report = pipeline.run("content", records).await.unwrap();

    assert_eq!(report.verdict, Verdict::Success);
    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 0);
    // The large video body was extracted; the pre-existing reference is
    // reported skipped with no upload attempted
    assert_eq!(report.blobs_pushed, 1);
    assert_eq!(report.blobs_skipped, 1);
    assert_eq!(report.blobs_failed, 0);
    assert_eq!(report.batches.len(), 1);
    assert!(report.preflight.as_ref().unwrap().passed());
    assert!(report.postflight.as_ref().unwrap().passed());
    blob_store.verify().await;
}

#[tokio::test]
async fn test_preflight_failure_precedes_blob_store_writes() {
    let destination = MockServer::start().await;
    let blob_store = MockServer::start().await;
    let cache = TempDir::new().unwrap();

    // Dead destination: the health probe fails outright
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&destination)
        .await;
    // The blob store must never be touched, not even for an extractable body
    Mock::given(method("HEAD"))
        .and(path_regex("^/store/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&blob_store)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex("^/store/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&blob_store)
        .await;

    let mut config = PublishConfig::new();
    config.destination_url = destination.uri();
    config.blob_store_url = blob_store.uri();
    config.cache_dir = cache.path().to_path_buf();
    config.api_timeout_secs = 5;

    let policy = ExtractionPolicy::new(["video".to_string()], 1024);
    let pipeline = IngestPipeline::with_policy(config, policy).unwrap();
    let records = vec![ContentRecord::inline("clip-1", "video", vec![7u8; 20 * 1024])];

    let err = pipeline.run("content", records).await.unwrap_err();
    assert!(matches!(err, cip_publish::PublishError::PreflightFailed(_)));
    blob_store.verify().await;
}

#[tokio::test]
async fn test_preflight_failure_blocks_all_writes() {
    let destination = MockServer::start().await;
    let blob_store = MockServer::start().await;
    let cache = TempDir::new().unwrap();

    // Healthy but rejects the synthetic write
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(&destination)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json(10)))
        .mount(&destination)
        .await;
    Mock::given(method("POST"))
        .and(path("/bulk/content"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&destination)
        .await;
    // No import may ever be queued
    Mock::given(method("POST"))
        .and(path("/import/content"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&destination)
        .await;

    let mut config = PublishConfig::new();
    config.destination_url = destination.uri();
    config.blob_store_url = blob_store.uri();
    config.cache_dir = cache.path().to_path_buf();
    config.api_timeout_secs = 5;

    let pipeline = IngestPipeline::new(config).unwrap();
    let records = vec![ContentRecord::inline("r-1", "markdown", b"body".to_vec())];

    let err = pipeline.run("content", records).await.unwrap_err();
    assert!(matches!(err, cip_publish::PublishError::PreflightFailed(_)));
    destination.verify().await;
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let cache = TempDir::new().unwrap();

    let mut config = PublishConfig::new();
    // Unroutable: any network call would error the run
    config.destination_url = "http://127.0.0.1:1".to_string();
    config.blob_store_url = "http://127.0.0.1:1".to_string();
    config.cache_dir = cache.path().to_path_buf();
    config.dry_run = true;

    let pipeline = IngestPipeline::new(config).unwrap();
    let records = vec![
        ContentRecord::inline("r-1", "markdown", b"body".to_vec()),
        ContentRecord::inline("r-2", "markdown", b"more".to_vec()),
    ];

    let report = pipeline.run("content", records).await.unwrap();
    assert_eq!(report.verdict, Verdict::Success);
    assert_eq!(report.succeeded, 2);
    assert!(report.preflight.is_none());
    assert!(report.postflight.is_none());
}
