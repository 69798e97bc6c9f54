//! Testing utilities and mock implementations.
//!
//! This module provides scripted stage tasks and a recording ingestion
//! handler, allowing pipeline tests without a model server.
//!
//! # Example
//!
//! ```rust,ignore
//! use docflow_core::testing::{fixtures, MockTask};
//!
//! let (mut registry, tasks) = fixtures::succeeding_registry();
//! registry.register(Stage::Clarified, Arc::new(MockTask::failing("clarify", "x")))?;
//!
//! // Use with PipelineOrchestrator...
//! ```

mod mock_task;
mod recording_handler;

pub use mock_task::{MockBehavior, MockTask, TaskGate};
pub use recording_handler::RecordingHandler;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;

    use super::MockTask;
    use crate::document::{Document, Stage};
    use crate::ingest::{IncomingDocument, IngestionConfig};
    use crate::task::TaskRegistry;

    /// Content long enough to pass the default size checks.
    pub const SAMPLE_CONTENT: &str =
        "Rust ownership rules: each value has a single owner, and the value is dropped \
         when the owner goes out of scope.";

    /// A document with sample content.
    pub fn document(id: &str) -> Document {
        Document::new(id, SAMPLE_CONTENT)
            .with_metadata("original_filename", serde_json::json!(format!("{}.md", id)))
    }

    /// An incoming document with sample content.
    pub fn incoming(id: &str) -> IncomingDocument {
        IncomingDocument::new(SAMPLE_CONTENT)
            .with_id(id)
            .with_metadata("original_filename", serde_json::json!(format!("{}.md", id)))
    }

    /// A registry with a succeeding task for every stage.
    ///
    /// Returns the tasks in pipeline order (capture first) so tests can
    /// check call counts.
    pub fn succeeding_registry() -> (TaskRegistry, Vec<MockTask>) {
        let mut registry = TaskRegistry::new();
        let mut tasks = Vec::new();
        for &stage in Stage::Created.following() {
            if let Some(name) = stage.task_name() {
                let task = MockTask::succeeding(name);
                // following() only yields task stages
                let _ = registry.register(stage, Arc::new(task.clone()));
                tasks.push(task);
            }
        }
        (registry, tasks)
    }

    /// Ingestion settings with a short drain interval and millisecond backoff.
    pub fn fast_ingestion_config() -> IngestionConfig {
        IngestionConfig {
            interval_seconds: 1,
            retry_backoff_ms: 10,
            shutdown_grace_secs: 5,
            ..Default::default()
        }
    }
}
