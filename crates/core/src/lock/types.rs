//! Lock error types.

use thiserror::Error;

use crate::store::StoreError;

/// Errors returned by the lock manager.
#[derive(Debug, Error)]
pub enum LockError {
    /// An unexpired lock exists, whoever holds it.
    #[error("document {document_id} is locked by {holder}")]
    Held { document_id: String, holder: String },

    /// Release or refresh attempted by an agent that does not hold the lock.
    #[error("lock on {document_id} is held by {holder}, not {agent_id}")]
    Mismatch {
        document_id: String,
        holder: String,
        agent_id: String,
    },

    /// No live lock exists for the document.
    #[error("document {0} is not locked")]
    NotLocked(String),

    /// Backing store failure.
    #[error("lock store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LockError::Held {
            document_id: "doc-1".to_string(),
            holder: "agent-a".to_string(),
        };
        assert_eq!(err.to_string(), "document doc-1 is locked by agent-a");

        let err = LockError::NotLocked("doc-2".to_string());
        assert_eq!(err.to_string(), "document doc-2 is not locked");
    }
}
