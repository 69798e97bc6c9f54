//! Stage task trait and result types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::llm::LlmError;

/// Structured result reported by a stage task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    /// Stage payload merged into the document on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Failure reason when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    /// Successful result carrying a payload.
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Successful result without a payload.
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            payload: None,
            error: None,
        }
    }

    /// Reported failure.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// Unexpected fault raised by a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

/// Processing logic for one stage.
///
/// Tasks may be slow (network-bound) and must not retry on their own;
/// retries belong to the ingestion queue.
#[async_trait]
pub trait StageTask: Send + Sync {
    /// Task name (e.g. "capture", "clarify").
    fn name(&self) -> &str;

    /// Process a document.
    ///
    /// `Ok` with `success == false` is a reported failure; `Err` is a fault.
    async fn run(&self, document: &Document) -> Result<TaskResult, TaskError>;
}
