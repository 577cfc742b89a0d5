//! Integration tests for pre-flight and post-flight verification

use cip_publish::api::ApiClient;
use cip_publish::{CheckStatus, IngestionVerifier};
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(uri: &str) -> ApiClient {
    ApiClient::new(uri.to_string(), Duration::from_secs(5)).unwrap()
}

async fn mount_healthy(server: &MockServer, counts: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"ready": true, "counts": counts})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_preflight_passes_against_healthy_destination() {
    let server = MockServer::start().await;
    mount_healthy(&server, serde_json::json!({"content": 100})).await;

    Mock::given(method("POST"))
        .and(path("/bulk/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "inserted": 1, "skipped": 0, "errors": [],
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/content/cip-preflight-"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "x"})))
        .mount(&server)
        .await;

    let api = client(&server.uri());
    let result = IngestionVerifier::new(&api).preflight().await.unwrap();

    assert!(result.passed());
    assert_eq!(result.baseline_counts.get("content"), Some(&100));
}

#[tokio::test]
async fn test_preflight_fails_when_unreachable() {
    let api = client("http://127.0.0.1:1");
    let result = IngestionVerifier::new(&api).preflight().await.unwrap();

    assert!(!result.passed());
    assert!(result.failure_summary().contains("unreachable"));
}

#[tokio::test]
async fn test_preflight_duplicate_rejection_counts_as_pass() {
    let server = MockServer::start().await;
    mount_healthy(&server, serde_json::json!({})).await;

    Mock::given(method("POST"))
        .and(path("/bulk/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "inserted": 0, "skipped": 0, "errors": ["record already exists"],
        })))
        .mount(&server)
        .await;

    let api = client(&server.uri());
    let result = IngestionVerifier::new(&api).preflight().await.unwrap();

    assert!(result.passed());
}

#[tokio::test]
async fn test_preflight_fails_when_write_not_read_back() {
    let server = MockServer::start().await;
    mount_healthy(&server, serde_json::json!({})).await;

    Mock::given(method("POST"))
        .and(path("/bulk/content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "inserted": 1, "skipped": 0, "errors": [],
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/content/cip-preflight-"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let api = client(&server.uri());
    let result = IngestionVerifier::new(&api).preflight().await.unwrap();

    assert!(!result.passed());
}

async fn postflight_delta(
    after: u64,
    expected: u64,
) -> cip_publish::PostflightResult {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"ready": true, "counts": {"content": after}}),
        ))
        .mount(&server)
        .await;

    let api = client(&server.uri());
    let baseline = HashMap::from([("content".to_string(), 100u64)]);
    let expected_new = HashMap::from([("content".to_string(), expected)]);
    IngestionVerifier::new(&api)
        .postflight(&baseline, &expected_new, &[])
        .await
        .unwrap()
}

#[tokio::test]
async fn test_postflight_no_growth_fails() {
    let result = postflight_delta(100, 50).await;
    assert!(!result.passed());
    assert_eq!(result.checks[0].status, CheckStatus::Fail);
}

#[tokio::test]
async fn test_postflight_partial_growth_warns() {
    let result = postflight_delta(120, 50).await;
    assert!(result.passed());
    assert_eq!(result.checks[0].status, CheckStatus::Warn);
}

#[tokio::test]
async fn test_postflight_full_growth_passes() {
    let result = postflight_delta(150, 50).await;
    assert!(result.passed());
    assert_eq!(result.checks[0].status, CheckStatus::Pass);
}

#[tokio::test]
async fn test_postflight_samples_submitted_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"ready": true, "counts": {"content": 102}}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/content/found"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "found"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/content/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let api = client(&server.uri());
    let baseline = HashMap::from([("content".to_string(), 100u64)]);
    let expected_new = HashMap::from([("content".to_string(), 2u64)]);
    let submitted = vec!["found".to_string(), "missing".to_string()];

    let result = IngestionVerifier::new(&api)
        .postflight(&baseline, &expected_new, &submitted)
        .await
        .unwrap();

    let sample = result
        .checks
        .iter()
        .find(|c| c.name == "sample_existence")
        .unwrap();
    assert_eq!(sample.status, CheckStatus::Warn);
    assert_eq!(sample.actual, Some(1));
}
