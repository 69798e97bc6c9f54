//! Mock stage task for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::document::Document;
use crate::task::{StageTask, TaskError, TaskResult};

/// What a [`MockTask`] does when invoked.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return this result.
    Return(TaskResult),
    /// Return `Err(TaskError::Other(msg))`.
    Fault(String),
    /// Panic inside the task.
    Panic,
}

/// Pauses a [`MockTask`] mid-run until the test lets it continue.
#[derive(Debug, Clone, Default)]
pub struct TaskGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl TaskGate {
    /// Wait until the gated task has started running.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one gated invocation finish.
    pub fn open(&self) {
        self.release.notify_one();
    }
}

/// Mock implementation of the StageTask trait.
///
/// Provides controllable behavior for testing:
/// - Scripted results per invocation, falling back to a default
/// - Call counting and recording of the documents seen
/// - Optional delay or gate to hold the task mid-run
///
/// # Example
///
/// ```rust,ignore
/// use docflow_core::testing::{MockBehavior, MockTask};
///
/// let task = MockTask::succeeding("capture")
///     .then(MockBehavior::Fault("timeout".into()));
///
/// // First call faults, later calls succeed.
/// registry.register(Stage::Captured, Arc::new(task.clone()))?;
/// assert_eq!(task.call_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockTask {
    name: String,
    default: MockBehavior,
    /// Behaviors consumed before falling back to `default`.
    script: Arc<Mutex<VecDeque<MockBehavior>>>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
    gate: Option<TaskGate>,
}

impl MockTask {
    pub fn new(name: impl Into<String>, default: MockBehavior) -> Self {
        Self {
            name: name.into(),
            default,
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
            delay: None,
            gate: None,
        }
    }

    /// A task that always succeeds with `{"task": name}` as payload.
    pub fn succeeding(name: impl Into<String>) -> Self {
        let name = name.into();
        let payload = serde_json::json!({ "task": name });
        Self::new(name, MockBehavior::Return(TaskResult::ok(payload)))
    }

    /// A task that always reports failure.
    pub fn failing(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(name, MockBehavior::Return(TaskResult::failed(error)))
    }

    /// A task that always returns an error.
    pub fn faulting(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, MockBehavior::Fault(message.into()))
    }

    /// Queue a behavior for the next unscripted invocation.
    pub fn then(self, behavior: MockBehavior) -> Self {
        self.script_lock().push_back(behavior);
        self
    }

    /// Sleep for `delay` before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Block every invocation until the returned gate is opened.
    pub fn gated(mut self) -> (Self, TaskGate) {
        let gate = TaskGate::default();
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Number of times the task has run.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ids of the documents the task has run on, in order.
    pub fn seen_documents(&self) -> Vec<String> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn script_lock(&self) -> std::sync::MutexGuard<'_, VecDeque<MockBehavior>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StageTask for MockTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, document: &Document) -> Result<TaskResult, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(document.id.clone());

        let behavior = self
            .script_lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match behavior {
            MockBehavior::Return(result) => Ok(result),
            MockBehavior::Fault(message) => Err(TaskError::Other(message)),
            MockBehavior::Panic => panic!("mock task '{}' panicked", self.name),
        }
    }
}
