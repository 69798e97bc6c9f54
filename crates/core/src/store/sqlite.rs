//! SQLite-backed state store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::document::{Document, DocumentState};

use super::{StateFilter, StateStore, StoreError};

/// SQLite-backed state store.
///
/// Documents and states are stored as JSON bodies; the columns next to them
/// exist for filtering and version checks.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Create a new SQLite state store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite state store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS document_states (
                document_id TEXT PRIMARY KEY,
                current_stage TEXT NOT NULL,
                lock_holder TEXT,
                version INTEGER NOT NULL,
                body TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_states_stage ON document_states(current_stage);
            CREATE INDEX IF NOT EXISTS idx_states_lock_holder ON document_states(lock_holder);
            CREATE INDEX IF NOT EXISTS idx_states_last_updated ON document_states(last_updated);
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn parse_states(bodies: Vec<String>) -> Result<Vec<DocumentState>, StoreError> {
        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }
}

impl StateStore for SqliteStateStore {
    fn get_state(&self, document_id: &str) -> Result<Option<DocumentState>, StoreError> {
        let conn = self.conn()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM document_states WHERE document_id = ?",
                params![document_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
            .transpose()
    }

    fn put_state(&self, state: &DocumentState) -> Result<(), StoreError> {
        let body = serde_json::to_string(state)?;
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let stored: Option<i64> = tx
            .query_row(
                "SELECT version FROM document_states WHERE document_id = ?",
                params![state.document_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if let Some(stored) = stored {
            let stored = stored as u64;
            if stored >= state.version {
                return Err(StoreError::VersionConflict {
                    document_id: state.document_id.clone(),
                    stored,
                    attempted: state.version,
                });
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO document_states (document_id, current_stage, lock_holder, version, body, last_updated) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                state.document_id,
                state.current_stage.as_str(),
                state.lock.as_ref().map(|l| l.holder_agent_id.clone()),
                state.version as i64,
                body,
                state.last_updated.to_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tx.commit().map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.conn()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE id = ?",
                params![document_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
            .transpose()
    }

    fn put_document(&self, document: &Document) -> Result<(), StoreError> {
        let body = serde_json::to_string(document)?;
        let status = serde_json::to_value(document.status)?
            .as_str()
            .unwrap_or("pending")
            .to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO documents (id, status, body, updated_at) VALUES (?, ?, ?, ?)",
            params![document.id, status, body, Utc::now().to_rfc3339()],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn list_states(&self, filter: &StateFilter) -> Result<Vec<DocumentState>, StoreError> {
        let conn = self.conn()?;
        let limit = filter.limit as i64;

        let bodies: Vec<String> = match filter.stage {
            Some(stage) => {
                let mut stmt = conn
                    .prepare(
                        "SELECT body FROM document_states WHERE current_stage = ? ORDER BY last_updated DESC LIMIT ?",
                    )
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                let rows = stmt
                    .query_map(params![stage.as_str(), limit], |row| row.get(0))
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                rows.collect::<Result<_, _>>()
                    .map_err(|e| StoreError::Database(e.to_string()))?
            }
            None => {
                let mut stmt = conn
                    .prepare("SELECT body FROM document_states ORDER BY last_updated DESC LIMIT ?")
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                let rows = stmt
                    .query_map(params![limit], |row| row.get(0))
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                rows.collect::<Result<_, _>>()
                    .map_err(|e| StoreError::Database(e.to_string()))?
            }
        };

        Self::parse_states(bodies)
    }

    fn list_locked(&self) -> Result<Vec<DocumentState>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT body FROM document_states WHERE lock_holder IS NOT NULL")
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let bodies: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Self::parse_states(bodies)
    }

    fn delete(&self, document_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let states = conn
            .execute(
                "DELETE FROM document_states WHERE document_id = ?",
                params![document_id],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let documents = conn
            .execute("DELETE FROM documents WHERE id = ?", params![document_id])
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(states + documents > 0)
    }
}
