//! Common test utilities for API testing with mock stage tasks.
//!
//! This module provides a test fixture that creates an in-process router
//! backed by a SQLite store in a temp dir, a real orchestrator and queue,
//! and mock tasks for every pipeline stage.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use docflow_core::testing::{fixtures, MockTask, RecordingHandler};
use docflow_core::{
    Config, IngestionQueue, LockManager, PipelineOrchestrator, SqliteStateStore, StateStore,
};
use docflow_server::state::AppState;

/// Test fixture for API testing with mock stage tasks.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/documents", json!({
///         "content": "Notes from the planning meeting"
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub store: Arc<dyn StateStore>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub queue: Arc<IngestionQueue>,
    /// Records every queue outcome
    pub handler: Arc<RecordingHandler>,
    /// Stage tasks in pipeline order
    pub tasks: Vec<MockTask>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Start the queue's drain loop
    pub start_queue: bool,
    pub max_queue_size: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            start_queue: true,
            max_queue_size: 100,
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with a running queue.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = Config::default();
        config.server.port = 0; // Not used for in-process testing
        config.database.path = db_path.clone();
        config.ingestion = fixtures::fast_ingestion_config();
        config.ingestion.max_queue_size = test_config.max_queue_size;

        let store: Arc<dyn StateStore> =
            Arc::new(SqliteStateStore::new(&db_path).expect("Failed to create state store"));
        let locks = Arc::new(LockManager::with_ttl(
            Arc::clone(&store),
            config.lock.default_ttl(),
        ));
        let (registry, tasks) = fixtures::succeeding_registry();

        let orchestrator = Arc::new(PipelineOrchestrator::new(
            config.orchestrator.clone(),
            Arc::clone(&store),
            locks,
            registry,
        ));
        orchestrator
            .start()
            .await
            .expect("Failed to start orchestrator");

        let handler = Arc::new(RecordingHandler::new());
        let queue = Arc::new(IngestionQueue::new(
            config.ingestion.clone(),
            Arc::clone(&orchestrator),
            handler.clone(),
        ));
        if test_config.start_queue {
            queue.start().await;
        }

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&store),
            Arc::clone(&orchestrator),
            Arc::clone(&queue),
        ));
        let router = docflow_server::api::create_router(state);

        Self {
            router,
            store,
            orchestrator,
            queue,
            handler,
            tasks,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
