//! In-process API tests against a real orchestrator and ingestion queue.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use common::{TestConfig, TestFixture};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_health_reports_components() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["orchestrator"]["running"], true);
    assert_eq!(response.body["orchestrator"]["agent_id"], "pipeline");
    assert_eq!(
        response.body["orchestrator"]["registered_stages"]
            .as_array()
            .map(Vec::len),
        Some(6)
    );
    assert_eq!(response.body["ingestion_running"], true);
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["lock"]["default_ttl_secs"], 600);
    assert_eq!(response.body["ingestion"]["max_queue_size"], 100);
    assert!(response.body["llm"].is_null());
}

#[tokio::test]
async fn test_submitted_document_runs_to_completion() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/documents",
            json!({
                "id": "meeting-notes",
                "content": "Discussed the Q3 roadmap and hiring plan.",
                "metadata": { "source": "upload" }
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["id"], "meeting-notes");
    assert_eq!(response.body["status"], "queued");

    assert!(fixture.handler.wait_for_outcomes(1, WAIT).await);

    let state = fixture.get("/api/v1/documents/meeting-notes/state").await;
    assert_eq!(state.status, StatusCode::OK);
    assert_eq!(state.body["current_stage"], "CONNECTED");
    assert!(state.body["lock"].is_null());

    let document = fixture.get("/api/v1/documents/meeting-notes").await;
    assert_eq!(document.status, StatusCode::OK);
    assert_eq!(document.body["metadata"]["source"], "upload");
    assert!(fixture.tasks.iter().all(|t| t.call_count() == 1));
}

#[tokio::test]
async fn test_submit_generates_id() {
    let fixture = TestFixture::with_config(TestConfig {
        start_queue: false,
        ..Default::default()
    })
    .await;

    let response = fixture
        .post("/api/v1/documents", json!({ "content": "hello" }))
        .await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    let id = response.body["id"].as_str().unwrap_or_default();
    assert!(!id.is_empty());
    assert_eq!(fixture.queue.queue_size(), 1);
}

#[tokio::test]
async fn test_submit_with_blank_id_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/documents", json!({ "id": "  ", "content": "x" }))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_full_queue_returns_service_unavailable() {
    let fixture = TestFixture::with_config(TestConfig {
        start_queue: false,
        max_queue_size: 2,
    })
    .await;

    for i in 0..2 {
        let response = fixture
            .post(
                "/api/v1/documents",
                json!({ "id": format!("doc-{}", i), "content": "x" }),
            )
            .await;
        assert_eq!(response.status, StatusCode::ACCEPTED);
    }

    let response = fixture
        .post("/api/v1/documents", json!({ "id": "doc-2", "content": "x" }))
        .await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);

    let stats = fixture.get("/api/v1/ingestion/stats").await;
    assert_eq!(stats.status, StatusCode::OK);
    assert_eq!(stats.body["queue_size"], 2);
    assert_eq!(stats.body["rejected"], 1);
    assert_eq!(stats.body["running"], false);
    assert_eq!(fixture.handler.queue_full_count(), 1);
}

#[tokio::test]
async fn test_submit_after_stop_returns_service_unavailable() {
    let fixture = TestFixture::new().await;
    fixture.queue.stop().await;

    let response = fixture
        .post("/api/v1/documents", json!({ "content": "late" }))
        .await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unknown_document_is_not_found() {
    let fixture = TestFixture::new().await;

    assert_eq!(
        fixture.get("/api/v1/documents/missing").await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        fixture.get("/api/v1/documents/missing/state").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_list_documents_filters_by_stage() {
    let fixture = TestFixture::new().await;

    fixture
        .post(
            "/api/v1/documents",
            json!({ "id": "a", "content": "First draft of the onboarding guide." }),
        )
        .await;
    fixture
        .post(
            "/api/v1/documents",
            json!({ "id": "b", "content": "Second draft of the onboarding guide." }),
        )
        .await;
    assert!(fixture.handler.wait_for_outcomes(2, WAIT).await);
    assert_eq!(fixture.handler.processed().len(), 2);
    assert!(fixture.handler.failures().is_empty());

    let connected = fixture.get("/api/v1/documents?stage=CONNECTED").await;
    assert_eq!(connected.status, StatusCode::OK);
    assert_eq!(connected.body["documents"].as_array().map(Vec::len), Some(2));

    let created = fixture.get("/api/v1/documents?stage=CREATED").await;
    assert_eq!(created.body["documents"].as_array().map(Vec::len), Some(0));

    let limited = fixture.get("/api/v1/documents?limit=5000").await;
    assert_eq!(limited.body["limit"], 1000);
}

#[tokio::test]
async fn test_list_documents_rejects_unknown_stage() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/documents?stage=PUBLISHED").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_pipeline_gauges() {
    let fixture = TestFixture::new().await;

    fixture
        .post(
            "/api/v1/documents",
            json!({ "id": "m", "content": "Release checklist for the metrics rollout." }),
        )
        .await;
    assert!(fixture.handler.wait_for_outcomes(1, WAIT).await);
    assert_eq!(fixture.handler.processed().len(), 1);

    let (status, body) = fixture.get_text("/api/v1/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("docflow_documents_by_stage{stage=\"CONNECTED\"}"));
    assert!(body.contains("docflow_orchestrator_running"));
    assert!(body.contains("docflow_http_requests_total"));
}
