//! State tracker implementation.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::document::{DocumentState, ErrorInfo, Stage, StateTransition};
use crate::metrics;
use crate::store::{StateStore, StoreError};

/// Errors returned by [`StateTracker`].
#[derive(Debug, Error)]
pub enum TransitionError {
    /// No state record exists for the document.
    #[error("no state for document {0}")]
    NotFound(String),

    /// The document is locked by a different agent.
    #[error("document {document_id} is locked by {holder}, not {agent_id}")]
    LockConflict {
        document_id: String,
        holder: String,
        agent_id: String,
    },

    /// The target stage does not move the document forward.
    #[error("invalid transition for {document_id}: {from} -> {to}")]
    InvalidOrder {
        document_id: String,
        from: Stage,
        to: Stage,
    },

    /// State store error.
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
}

/// Ordering rules for forward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any strictly later stage is allowed.
    #[default]
    AllowSkips,
    /// Only the immediately following stage is allowed.
    Strict,
}

/// Validates and records stage transitions.
pub struct StateTracker {
    store: Arc<dyn StateStore>,
    policy: TransitionPolicy,
}

impl StateTracker {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self::with_policy(store, TransitionPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn StateStore>, policy: TransitionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Load a document's state.
    pub fn get(&self, document_id: &str) -> Result<Option<DocumentState>, TransitionError> {
        Ok(self.store.get_state(document_id)?)
    }

    /// Load a document's state, creating and persisting a fresh one at
    /// `Created` when none exists.
    ///
    /// An existing record without a content hash gets `content_hash`; a
    /// recorded hash is never replaced.
    pub fn get_or_create(
        &self,
        document_id: &str,
        content_hash: Option<&str>,
    ) -> Result<DocumentState, TransitionError> {
        if let Some(mut state) = self.store.get_state(document_id)? {
            if let (None, Some(hash)) = (&state.content_hash, content_hash) {
                state.content_hash = Some(hash.to_string());
                state.touch();
                self.store.put_state(&state)?;
            }
            return Ok(state);
        }
        let mut state = DocumentState::new(document_id);
        state.content_hash = content_hash.map(str::to_string);
        self.store.put_state(&state)?;
        debug!("Created state record for {}", document_id);
        Ok(state)
    }

    /// Move a document to a later stage.
    ///
    /// `Error` targets go through [`StateTracker::transition_to_error`] so
    /// they always carry an error descriptor.
    pub fn transition(
        &self,
        document_id: &str,
        to_stage: Stage,
        agent_id: &str,
        message: Option<String>,
    ) -> Result<DocumentState, TransitionError> {
        let mut state = self.load_unlocked(document_id, agent_id)?;
        let from = state.current_stage;

        if to_stage.is_error() || !self.allows(from, to_stage) {
            return Err(TransitionError::InvalidOrder {
                document_id: document_id.to_string(),
                from,
                to: to_stage,
            });
        }

        self.commit(&mut state, to_stage, agent_id, message)?;
        info!("Document {} moved {} -> {} by {}", document_id, from, to_stage, agent_id);
        Ok(state)
    }

    /// Move a document to `Error`, recording the failure descriptor.
    ///
    /// Allowed from any stage.
    pub fn transition_to_error(
        &self,
        document_id: &str,
        agent_id: &str,
        error: ErrorInfo,
    ) -> Result<DocumentState, TransitionError> {
        let mut state = self.load_unlocked(document_id, agent_id)?;
        let from = state.current_stage;
        let message = format!("Error in {} task: {}", error.task, error.message);

        state.error_info = Some(error);
        self.commit(&mut state, Stage::Error, agent_id, Some(message))?;
        info!("Document {} moved {} -> ERROR by {}", document_id, from, agent_id);
        Ok(state)
    }

    fn allows(&self, from: Stage, to: Stage) -> bool {
        match (from.ordinal(), to.ordinal()) {
            (Some(from_idx), Some(to_idx)) => match self.policy {
                TransitionPolicy::AllowSkips => to_idx > from_idx,
                TransitionPolicy::Strict => to_idx == from_idx + 1,
            },
            // Error is absorbing
            _ => false,
        }
    }

    fn load_unlocked(
        &self,
        document_id: &str,
        agent_id: &str,
    ) -> Result<DocumentState, TransitionError> {
        let state = self
            .store
            .get_state(document_id)?
            .ok_or_else(|| TransitionError::NotFound(document_id.to_string()))?;

        if let Some(lock) = state.active_lock() {
            if !lock.is_held_by(agent_id) {
                return Err(TransitionError::LockConflict {
                    document_id: document_id.to_string(),
                    holder: lock.holder_agent_id.clone(),
                    agent_id: agent_id.to_string(),
                });
            }
        }
        Ok(state)
    }

    fn commit(
        &self,
        state: &mut DocumentState,
        to_stage: Stage,
        agent_id: &str,
        message: Option<String>,
    ) -> Result<(), TransitionError> {
        state.transition_history.push(StateTransition {
            from_stage: state.current_stage,
            to_stage,
            agent_id: agent_id.to_string(),
            timestamp: Utc::now(),
            message,
        });
        state.previous_stage = Some(state.current_stage);
        state.current_stage = to_stage;
        state.touch();
        self.store.put_state(state)?;

        metrics::STAGE_TRANSITIONS
            .with_label_values(&[to_stage.as_str()])
            .inc();
        Ok(())
    }
}
