//! In-memory state store.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::document::{Document, DocumentState};

use super::{StateFilter, StateStore, StoreError};

/// Process-local store backed by hash maps.
///
/// Useful for tests and for embedding the pipeline without a database.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, DocumentState>>,
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Database("store lock poisoned".to_string())
}

impl StateStore for InMemoryStateStore {
    fn get_state(&self, document_id: &str) -> Result<Option<DocumentState>, StoreError> {
        let states = self.states.read().map_err(|_| poisoned())?;
        Ok(states.get(document_id).cloned())
    }

    fn put_state(&self, state: &DocumentState) -> Result<(), StoreError> {
        let mut states = self.states.write().map_err(|_| poisoned())?;
        if let Some(existing) = states.get(&state.document_id) {
            if existing.version >= state.version {
                return Err(StoreError::VersionConflict {
                    document_id: state.document_id.clone(),
                    stored: existing.version,
                    attempted: state.version,
                });
            }
        }
        states.insert(state.document_id.clone(), state.clone());
        Ok(())
    }

    fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().map_err(|_| poisoned())?;
        Ok(documents.get(document_id).cloned())
    }

    fn put_document(&self, document: &Document) -> Result<(), StoreError> {
        let mut documents = self.documents.write().map_err(|_| poisoned())?;
        documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    fn list_states(&self, filter: &StateFilter) -> Result<Vec<DocumentState>, StoreError> {
        let states = self.states.read().map_err(|_| poisoned())?;
        let mut matching: Vec<DocumentState> = states
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        matching.truncate(filter.limit);
        Ok(matching)
    }

    fn list_locked(&self) -> Result<Vec<DocumentState>, StoreError> {
        let states = self.states.read().map_err(|_| poisoned())?;
        Ok(states.values().filter(|s| s.lock.is_some()).cloned().collect())
    }

    fn delete(&self, document_id: &str) -> Result<bool, StoreError> {
        let removed_state = self
            .states
            .write()
            .map_err(|_| poisoned())?
            .remove(document_id)
            .is_some();
        let removed_doc = self
            .documents
            .write()
            .map_err(|_| poisoned())?
            .remove(document_id)
            .is_some();
        Ok(removed_state || removed_doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Stage;

    #[test]
    fn test_put_and_get_state() {
        let store = InMemoryStateStore::new();
        let state = DocumentState::new("doc-1");
        store.put_state(&state).unwrap();

        let fetched = store.get_state("doc-1").unwrap().unwrap();
        assert_eq!(fetched, state);
        assert!(store.get_state("missing").unwrap().is_none());
    }

    #[test]
    fn test_put_state_rejects_stale_version() {
        let store = InMemoryStateStore::new();
        let mut state = DocumentState::new("doc-1");
        store.put_state(&state).unwrap();

        // Same version again is stale
        let result = store.put_state(&state);
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));

        state.touch();
        store.put_state(&state).unwrap();
        assert_eq!(store.get_state("doc-1").unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_list_states_with_stage_filter() {
        let store = InMemoryStateStore::new();
        store.put_state(&DocumentState::new("a")).unwrap();
        let mut b = DocumentState::new("b");
        b.current_stage = Stage::Clarified;
        store.put_state(&b).unwrap();

        let all = store.list_states(&StateFilter::new()).unwrap();
        assert_eq!(all.len(), 2);

        let clarified = store
            .list_states(&StateFilter::new().with_stage(Stage::Clarified))
            .unwrap();
        assert_eq!(clarified.len(), 1);
        assert_eq!(clarified[0].document_id, "b");

        let limited = store.list_states(&StateFilter::new().with_limit(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_documents_and_delete() {
        let store = InMemoryStateStore::new();
        store.put_document(&Document::new("doc-1", "content")).unwrap();
        store.put_state(&DocumentState::new("doc-1")).unwrap();

        assert_eq!(
            store.get_document("doc-1").unwrap().unwrap().content,
            "content"
        );
        assert!(store.delete("doc-1").unwrap());
        assert!(!store.delete("doc-1").unwrap());
        assert!(store.get_document("doc-1").unwrap().is_none());
    }
}
