//! Types for the pipeline orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{Document, DocumentState, Stage};

/// Errors that abort an orchestrator run.
///
/// Task failures are not errors here: they end the run with the document
/// in `Error` and are reported through [`ProcessOutcome`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Lock acquisition or release failed (including `Held`).
    #[error("lock error: {0}")]
    Lock(#[from] crate::lock::LockError),

    /// State transition was rejected.
    #[error("transition error: {0}")]
    Transition(#[from] crate::tracker::TransitionError),

    /// State store error.
    #[error("state store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// Task lookup failed.
    #[error("task registry error: {0}")]
    Registry(#[from] crate::task::RegistryError),
}

impl OrchestratorError {
    /// Returns true when another agent holds the document lock.
    pub fn is_lock_held(&self) -> bool {
        matches!(self, OrchestratorError::Lock(crate::lock::LockError::Held { .. }))
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The document reached the final stage.
    Completed,
    /// The document advanced and stopped at the requested end stage.
    Advanced,
    /// A task failed and the document moved to `Error`.
    Errored,
    /// Nothing to do: already at or past the end stage, or in `Error`.
    Skipped,
}

/// Result of [`PipelineOrchestrator::process`](super::PipelineOrchestrator::process).
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Document with the payloads of every completed stage.
    pub document: Document,
    /// State record as persisted at the end of the run.
    pub state: DocumentState,
    pub status: RunStatus,
    /// Stages entered during this run, in order.
    pub stages_run: Vec<Stage>,
}

impl ProcessOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the expiry sweeper is running.
    pub running: bool,
    pub agent_id: String,
    /// Stages with a registered task.
    pub registered_stages: Vec<Stage>,
    /// Locks currently tracked in memory.
    pub tracked_locks: usize,
}
