//! Task invocation with timing and fault capture.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, warn};

use crate::document::{Document, Stage};
use crate::metrics;

use super::registry::{RegistryError, TaskRegistry};
use super::traits::TaskError;

/// How a task invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The task reported success.
    Succeeded { payload: Option<serde_json::Value> },
    /// The task reported failure.
    Failed { message: String },
    /// The task returned an error or panicked.
    Faulted { message: String },
}

impl TaskOutcome {
    fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Succeeded { .. } => "success",
            TaskOutcome::Failed { .. } => "failure",
            TaskOutcome::Faulted { .. } => "fault",
        }
    }
}

/// A completed task invocation.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub task_name: String,
    pub outcome: TaskOutcome,
    pub duration: Duration,
}

/// Invokes registered stage tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskRunner {
    registry: TaskRegistry,
}

impl TaskRunner {
    pub fn new(registry: TaskRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Task name for a stage, if one is registered.
    pub fn task_name(&self, stage: Stage) -> Result<String, RegistryError> {
        self.registry.get(stage).map(|t| t.name().to_string())
    }

    /// Run the task for `stage` on a document.
    ///
    /// Never fails for a registered stage: failures and faults are folded
    /// into the returned [`TaskOutcome`].
    pub async fn run(&self, stage: Stage, document: &Document) -> Result<TaskRun, RegistryError> {
        let task = self.registry.get(stage)?;
        let task_name = task.name().to_string();
        debug!("Running task '{}' on document {}", task_name, document.id);

        let started = Instant::now();
        let result = AssertUnwindSafe(task.run(document)).catch_unwind().await;
        let duration = started.elapsed();

        let outcome = match result {
            Ok(Ok(result)) if result.success => TaskOutcome::Succeeded {
                payload: result.payload,
            },
            Ok(Ok(result)) => TaskOutcome::Failed {
                message: result
                    .error
                    .unwrap_or_else(|| "task reported failure".to_string()),
            },
            Ok(Err(e)) => TaskOutcome::Faulted {
                message: e.to_string(),
            },
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!("Task '{}' panicked on document {}", task_name, document.id);
                TaskOutcome::Faulted {
                    message: TaskError::Panicked(message).to_string(),
                }
            }
        };

        metrics::TASK_DURATION
            .with_label_values(&[stage.as_str(), outcome.label()])
            .observe(duration.as_secs_f64());

        debug!(
            "Task '{}' finished in {:.2}s ({})",
            task_name,
            duration.as_secs_f64(),
            outcome.label()
        );

        Ok(TaskRun {
            task_name,
            outcome,
            duration,
        })
    }
}
