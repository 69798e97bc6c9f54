//! State store trait and filter types.

use thiserror::Error;

use crate::document::{Document, DocumentState, Stage};

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write carried a version that is not newer than the stored one.
    #[error("version conflict for {document_id}: stored {stored}, attempted {attempted}")]
    VersionConflict {
        document_id: String,
        stored: u64,
        attempted: u64,
    },

    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// A stored record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Filter for querying document states.
#[derive(Debug, Clone)]
pub struct StateFilter {
    /// Filter by current stage.
    pub stage: Option<Stage>,
    /// Maximum number of results.
    pub limit: usize,
}

impl Default for StateFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl StateFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            stage: None,
            limit: 100,
        }
    }

    /// Filter by current stage.
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub(crate) fn matches(&self, state: &DocumentState) -> bool {
        self.stage.is_none_or(|stage| state.current_stage == stage)
    }
}

/// Trait for document/state storage backends.
///
/// Implementations must be safe to call concurrently for different
/// document identifiers.
pub trait StateStore: Send + Sync {
    /// Get the state record of a document.
    fn get_state(&self, document_id: &str) -> Result<Option<DocumentState>, StoreError>;

    /// Insert or replace a state record.
    ///
    /// Fails with [`StoreError::VersionConflict`] when a stored record
    /// already has a version greater than or equal to `state.version`.
    fn put_state(&self, state: &DocumentState) -> Result<(), StoreError>;

    /// Get a document record.
    fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError>;

    /// Insert or replace a document record.
    fn put_document(&self, document: &Document) -> Result<(), StoreError>;

    /// List states matching the filter, most recently updated first.
    fn list_states(&self, filter: &StateFilter) -> Result<Vec<DocumentState>, StoreError>;

    /// List every state that carries a durable lock record, expired or not.
    fn list_locked(&self) -> Result<Vec<DocumentState>, StoreError>;

    /// Delete a document and its state. Returns true if anything was removed.
    fn delete(&self, document_id: &str) -> Result<bool, StoreError>;
}
