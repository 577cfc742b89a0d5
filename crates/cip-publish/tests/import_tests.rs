//! Integration tests for import orchestration

use cip_common::types::{ContentRecord, ImportQueueRequest, ImportStatus};
use cip_publish::{BlobPublisher, ImportOrchestrator, PublishConfig, PublishError};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(destination_url: &str, cache: &TempDir) -> PublishConfig {
    let mut config = PublishConfig::new();
    config.destination_url = destination_url.to_string();
    config.cache_dir = cache.path().to_path_buf();
    config.api_timeout_secs = 5;
    config.retry.default_retry_delay_secs = 0;
    config.retry.retry_delay_ceiling_secs = 0;
    config.import.poll_interval_secs = 0;
    config
}

fn queue_request(total_items: u32) -> ImportQueueRequest {
    ImportQueueRequest {
        batch_id: None,
        blob_address: "sha256-abc".to_string(),
        total_items,
        schema_version: 1,
        chunk_size: None,
        chunk_delay_ms: None,
    }
}

fn accepted_body(batch_id: &str, queued: u32) -> serde_json::Value {
    serde_json::json!({
        "batch_id": batch_id,
        "queued_count": queued,
        "processing": true,
    })
}

fn status_body(batch_id: &str, status: &str, processed: u32) -> serde_json::Value {
    serde_json::json!({
        "batch_id": batch_id,
        "status": status,
        "total_items": 10,
        "processed_count": processed,
        "error_count": 0,
        "errors": [],
    })
}

#[tokio::test]
async fn test_queue_import_accepted() {
    let server = MockServer::start().await;
    let cache = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/import/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(accepted_body("b-1", 10)))
        .mount(&server)
        .await;

    let orchestrator = ImportOrchestrator::from_config(&test_config(&server.uri(), &cache)).unwrap();
    let response = orchestrator
        .queue_import("content", &queue_request(10))
        .await
        .unwrap();

    assert_eq!(response.batch_id, "b-1");
    assert_eq!(response.queued_count, 10);
}

#[tokio::test]
async fn test_queue_import_retries_while_not_ready() {
    let server = MockServer::start().await;
    let cache = TempDir::new().unwrap();

    // Two warm-up responses, then acceptance
    Mock::given(method("POST"))
        .and(path("/import/content"))
        .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "0"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/import/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(accepted_body("b-2", 5)))
        .mount(&server)
        .await;

    let orchestrator = ImportOrchestrator::from_config(&test_config(&server.uri(), &cache)).unwrap();
    let response = orchestrator
        .queue_import("content", &queue_request(5))
        .await
        .unwrap();

    assert_eq!(response.batch_id, "b-2");
}

#[tokio::test]
async fn test_retry_exhaustion_makes_exactly_allowed_attempts() {
    let server = MockServer::start().await;
    let cache = TempDir::new().unwrap();

    let mut config = test_config(&server.uri(), &cache);
    config.retry.max_not_ready_retries = 3;

    // Initial attempt plus three retries, not one more
    Mock::given(method("POST"))
        .and(path("/import/content"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let orchestrator = ImportOrchestrator::from_config(&config).unwrap();
    let err = orchestrator
        .queue_import("content", &queue_request(5))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PublishError::NotReadyAfterRetries { attempts: 4 }
    ));
    server.verify().await;
}

#[tokio::test]
async fn test_get_status_unknown_batch() {
    let server = MockServer::start().await;
    let cache = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/import/content/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let orchestrator = ImportOrchestrator::from_config(&test_config(&server.uri(), &cache)).unwrap();
    let err = orchestrator.get_status("content", "missing").await.unwrap_err();

    assert!(matches!(err, PublishError::BatchNotFound { .. }));
}

#[tokio::test]
async fn test_queue_and_wait_polls_to_terminal() {
    let server = MockServer::start().await;
    let cache = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/import/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(accepted_body("b-3", 10)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/import/content/b-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("b-3", "processing", 4)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/import/content/b-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("b-3", "completed", 10)))
        .mount(&server)
        .await;

    let orchestrator = ImportOrchestrator::from_config(&test_config(&server.uri(), &cache)).unwrap();
    let update = orchestrator
        .queue_import_and_wait("content", &queue_request(10))
        .await
        .unwrap();

    assert_eq!(update.status, ImportStatus::Completed);
    assert_eq!(update.processed_count, 10);
}

#[tokio::test]
async fn test_wait_timeout_is_distinct_from_failure() {
    let server = MockServer::start().await;
    let cache = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/import/content/b-4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("b-4", "processing", 1)))
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri(), &cache);
    config.import.wait_timeout_secs = 0;

    let orchestrator = ImportOrchestrator::from_config(&config).unwrap();
    let err = orchestrator.wait_for_batch("content", "b-4").await.unwrap_err();

    assert!(matches!(err, PublishError::WaitTimeout { .. }));
}

#[tokio::test]
async fn test_submit_records_chunks_in_order() {
    let destination = MockServer::start().await;
    let blob_store = MockServer::start().await;
    let cache = TempDir::new().unwrap();

    Mock::given(method("HEAD"))
        .and(path_regex("^/store/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&blob_store)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex("^/store/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&blob_store)
        .await;
    // Five records with chunk size two means exactly three batches
    Mock::given(method("POST"))
        .and(path("/import/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(accepted_body("b-5", 2)))
        .expect(3)
        .mount(&destination)
        .await;

    let mut config = test_config(&destination.uri(), &cache);
    config.blob_store_url = blob_store.uri();
    config.import.chunk_size = 2;

    let orchestrator = ImportOrchestrator::from_config(&config).unwrap();
    let publisher = BlobPublisher::new(&config).unwrap();

    let records: Vec<ContentRecord> = (0..5)
        .map(|i| ContentRecord::inline(format!("r-{}", i), "markdown", b"body".to_vec()))
        .collect();

    let responses = orchestrator
        .submit_records(&publisher, "content", &records)
        .await
        .unwrap();

    assert_eq!(responses.len(), 3);
    destination.verify().await;
}

#[tokio::test]
async fn test_bulk_write_returns_server_counts() {
    let server = MockServer::start().await;
    let cache = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/bulk/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "inserted": 2,
            "skipped": 1,
            "errors": [],
        })))
        .mount(&server)
        .await;

    let orchestrator = ImportOrchestrator::from_config(&test_config(&server.uri(), &cache)).unwrap();
    let records = vec![
        ContentRecord::inline("a", "markdown", b"x".to_vec()),
        ContentRecord::inline("b", "markdown", b"y".to_vec()),
        ContentRecord::inline("c", "markdown", b"z".to_vec()),
    ];
    let result = orchestrator.bulk_write_content(&records).await.unwrap();

    assert_eq!(result.inserted, 2);
    assert_eq!(result.skipped, 1);
}

#[tokio::test]
async fn test_dry_run_queues_synthetically() {
    let cache = TempDir::new().unwrap();
    let mut config = test_config("http://127.0.0.1:1", &cache);
    config.dry_run = true;

    let orchestrator = ImportOrchestrator::from_config(&config).unwrap();
    let response = orchestrator
        .queue_import("content", &queue_request(7))
        .await
        .unwrap();

    assert_eq!(response.queued_count, 7);
    assert!(response.batch_id.starts_with("dry-run-"));
}
