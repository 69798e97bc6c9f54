//! Pipeline lifecycle integration tests.
//!
//! These tests drive the orchestrator over a SQLite state store with mock
//! stage tasks:
//! - Full runs, partial runs and restart-safe re-runs
//! - Task failures and faults moving documents to ERROR
//! - Lock exclusion between concurrent runs
//! - Lock release on every exit path, including cancellation

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use docflow_core::{
    testing::{fixtures, MockBehavior, MockTask},
    Document, DocumentStatus, HookPoint, LockManager, OrchestratorConfig, PipelineOrchestrator,
    RunStatus, SqliteStateStore, Stage, StateStore, TaskRegistry,
};

/// Test helper wiring an orchestrator to a file-backed store.
struct TestHarness {
    orchestrator: Arc<PipelineOrchestrator>,
    store: Arc<SqliteStateStore>,
    tasks: Vec<MockTask>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let (registry, tasks) = fixtures::succeeding_registry();
        Self::with_registry(registry, tasks)
    }

    /// Harness where the task for `stage` is replaced by `task`.
    fn with_task(stage: Stage, task: MockTask) -> Self {
        let (mut registry, mut tasks) = fixtures::succeeding_registry();
        registry
            .register(stage, Arc::new(task.clone()))
            .expect("Failed to register task");
        let idx = stage.ordinal().expect("task stage") - 1;
        tasks[idx] = task;
        Self::with_registry(registry, tasks)
    }

    fn with_registry(registry: TaskRegistry, tasks: Vec<MockTask>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteStateStore::new(&temp_dir.path().join("test.db"))
                .expect("Failed to create state store"),
        );
        let locks = Arc::new(LockManager::new(store.clone()));
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            OrchestratorConfig::default(),
            store.clone(),
            locks,
            registry,
        ));

        Self {
            orchestrator,
            store,
            tasks,
            temp_dir,
        }
    }

    fn task(&self, stage: Stage) -> &MockTask {
        &self.tasks[stage.ordinal().expect("task stage") - 1]
    }

    fn stage_of(&self, id: &str) -> Stage {
        self.store
            .get_state(id)
            .expect("store error")
            .expect("state missing")
            .current_stage
    }
}

// =============================================================================
// Full and Partial Runs
// =============================================================================

#[tokio::test]
async fn test_full_run_reaches_connected() {
    let harness = TestHarness::new();
    let doc = fixtures::document("D1");

    let outcome = harness.orchestrator.process(&doc, None).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    let state = harness.store.get_state("D1").unwrap().unwrap();
    assert_eq!(state.current_stage, Stage::Connected);
    assert_eq!(state.transition_history.len(), 6);
    assert!(state.lock.is_none(), "No lock should remain after the run");
    assert!(state.history_is_consistent());

    let targets: Vec<Stage> = state
        .transition_history
        .iter()
        .map(|t| t.to_stage)
        .collect();
    assert_eq!(targets, Stage::Created.following().to_vec());
    assert!(state
        .transition_history
        .iter()
        .all(|t| t.agent_id == "pipeline"));

    let stored = harness.store.get_document("D1").unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Completed);
    assert_eq!(
        stored.stage_result(Stage::Categorized),
        Some(&serde_json::json!({"task": "categorize"}))
    );
}

#[tokio::test]
async fn test_state_survives_store_reopen() {
    let harness = TestHarness::new();
    harness
        .orchestrator
        .process(&fixtures::document("D1"), Some(Stage::Clarified))
        .await
        .unwrap();

    let reopened = SqliteStateStore::new(&harness.temp_dir.path().join("test.db")).unwrap();
    let state = reopened.get_state("D1").unwrap().unwrap();
    assert_eq!(state.current_stage, Stage::Clarified);
    assert_eq!(state.previous_stage, Some(Stage::Contextualized));
    assert_eq!(state.transition_history.len(), 3);
}

#[tokio::test]
async fn test_rerun_at_categorized_does_not_repeat_tasks() {
    let harness = TestHarness::new();
    let doc = fixtures::document("D1");

    harness
        .orchestrator
        .process(&doc, Some(Stage::Categorized))
        .await
        .unwrap();
    assert_eq!(harness.stage_of("D1"), Stage::Categorized);

    let outcome = harness
        .orchestrator
        .process(&doc, Some(Stage::Categorized))
        .await
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Skipped);

    for stage in [
        Stage::Captured,
        Stage::Contextualized,
        Stage::Clarified,
        Stage::Categorized,
    ] {
        assert_eq!(harness.task(stage).call_count(), 1, "{} re-ran", stage);
    }

    // Continuing picks up after CATEGORIZED
    let outcome = harness.orchestrator.process(&doc, None).await.unwrap();
    assert_eq!(
        outcome.stages_run,
        vec![Stage::Crystallized, Stage::Connected]
    );
    assert_eq!(outcome.state.transition_history.len(), 6);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_clarify_failure_moves_to_error() {
    let harness = TestHarness::with_task(Stage::Clarified, MockTask::failing("clarify", "x"));

    let outcome = harness
        .orchestrator
        .process(&fixtures::document("D1"), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Errored);
    let state = harness.store.get_state("D1").unwrap().unwrap();
    assert_eq!(state.current_stage, Stage::Error);
    let info = state.error_info.as_ref().unwrap();
    assert_eq!(info.stage, Stage::Clarified);
    assert_eq!(info.task, "clarify");
    assert_eq!(
        state.transition_history.last().unwrap().message.as_deref(),
        Some("Error in clarify task: x")
    );
    assert!(state.lock.is_none());
    assert!(state.history_is_consistent());

    for stage in [Stage::Categorized, Stage::Crystallized, Stage::Connected] {
        assert_eq!(harness.task(stage).call_count(), 0, "{} ran", stage);
    }

    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["error_info"]["stage"], "CLARIFIED");
}

#[tokio::test]
async fn test_fault_moves_to_error() {
    let harness = TestHarness::with_task(
        Stage::Contextualized,
        MockTask::faulting("contextualize", "model unreachable"),
    );

    let outcome = harness
        .orchestrator
        .process(&fixtures::document("D1"), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Errored);
    let info = outcome.state.error_info.unwrap();
    assert_eq!(info.stage, Stage::Contextualized);
    assert!(info.message.contains("model unreachable"));
}

#[tokio::test]
async fn test_error_hooks_receive_document() {
    let harness = TestHarness::with_task(Stage::Captured, MockTask::failing("capture", "empty"));
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let s = seen.clone();
    harness
        .orchestrator
        .hooks()
        .register(HookPoint::Error, move |doc: &Document| {
            s.lock().unwrap().push(doc.id.clone());
            Ok(())
        });

    harness
        .orchestrator
        .process(&fixtures::document("D1"), None)
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["D1".to_string()]);
}

// =============================================================================
// Locking
// =============================================================================

#[tokio::test]
async fn test_concurrent_runs_exactly_one_holds_lock() {
    let (capture, gate) = MockTask::succeeding("capture").gated();
    let harness = TestHarness::with_task(Stage::Captured, capture);
    let doc = fixtures::document("D1");

    let orchestrator = harness.orchestrator.clone();
    let first_doc = doc.clone();
    let first = tokio::spawn(async move { orchestrator.process(&first_doc, None).await });

    // First run is inside the capture task, holding the lock
    gate.entered().await;

    let err = harness.orchestrator.process(&doc, None).await.unwrap_err();
    assert!(err.is_lock_held(), "Expected LockHeld, got {}", err);
    assert_eq!(harness.stage_of("D1"), Stage::Created);

    gate.open();
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(harness.task(Stage::Captured).call_count(), 1);
}

#[tokio::test]
async fn test_concurrent_acquires_grant_single_lock() {
    let harness = TestHarness::new();
    let locks = harness.orchestrator.locks().clone();

    let mut handles = Vec::new();
    for i in 0..8 {
        let locks = locks.clone();
        handles.push(tokio::spawn(async move {
            locks.acquire("D1", &format!("agent-{}", i), None).is_ok()
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
}

#[tokio::test]
async fn test_lock_released_for_every_outcome() {
    let cases = vec![
        ("success", MockTask::succeeding("capture")),
        ("failure", MockTask::failing("capture", "bad")),
        ("fault", MockTask::faulting("capture", "io")),
        ("panic", MockTask::new("capture", MockBehavior::Panic)),
    ];

    for (label, task) in cases {
        let harness = TestHarness::with_task(Stage::Captured, task);
        harness
            .orchestrator
            .process(&fixtures::document("D1"), Some(Stage::Captured))
            .await
            .unwrap();

        let state = harness.store.get_state("D1").unwrap().unwrap();
        assert!(state.lock.is_none(), "lock left behind after {}", label);
        assert_eq!(harness.orchestrator.locks().tracked_count(), 0);
    }
}

#[tokio::test]
async fn test_cancelled_run_releases_lock() {
    let (capture, gate) = MockTask::succeeding("capture").gated();
    let harness = TestHarness::with_task(Stage::Captured, capture);

    let orchestrator = harness.orchestrator.clone();
    let handle = tokio::spawn(async move {
        orchestrator
            .process(&fixtures::document("D1"), None)
            .await
    });

    gate.entered().await;
    assert!(harness.store.get_state("D1").unwrap().unwrap().lock.is_some());

    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    let state = harness.store.get_state("D1").unwrap().unwrap();
    assert!(state.lock.is_none());
    assert_eq!(state.current_stage, Stage::Created);
}

#[tokio::test]
async fn test_expired_lock_from_crashed_agent_is_reclaimed() {
    let harness = TestHarness::new();

    // A previous process died holding a lock that has since expired
    LockManager::new(harness.store.clone())
        .acquire("D1", "crashed-agent", Some(Duration::ZERO))
        .unwrap();

    harness.orchestrator.start().await.unwrap();
    let outcome = harness
        .orchestrator
        .process(&fixtures::document("D1"), None)
        .await
        .unwrap();
    harness.orchestrator.stop().await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert!(outcome.state.lock.is_none());
}

#[tokio::test]
async fn test_live_lock_from_other_agent_blocks_run() {
    let harness = TestHarness::new();
    harness
        .orchestrator
        .locks()
        .acquire("D1", "other-agent", Some(Duration::from_secs(60)))
        .unwrap();

    let err = harness
        .orchestrator
        .process(&fixtures::document("D1"), None)
        .await
        .unwrap_err();

    assert!(err.is_lock_held());
    assert!(harness.tasks.iter().all(|t| t.call_count() == 0));
}
