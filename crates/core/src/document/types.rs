//! Core document data types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Stage
// ============================================================================

/// Processing stage of a document.
///
/// The non-error stages form a total order; `Error` is absorbing and
/// reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Created,
    Captured,
    Contextualized,
    Clarified,
    Categorized,
    Crystallized,
    Connected,
    Error,
}

impl Stage {
    /// The ordered stage sequence, excluding `Error`.
    pub const SEQUENCE: [Stage; 7] = [
        Stage::Created,
        Stage::Captured,
        Stage::Contextualized,
        Stage::Clarified,
        Stage::Categorized,
        Stage::Crystallized,
        Stage::Connected,
    ];

    /// Position in [`Stage::SEQUENCE`], `None` for `Error`.
    pub fn ordinal(self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|s| *s == self)
    }

    /// The stage immediately after this one in the sequence.
    pub fn next(self) -> Option<Stage> {
        self.ordinal()
            .and_then(|idx| Self::SEQUENCE.get(idx + 1).copied())
    }

    /// Every stage strictly after this one, in order.
    pub fn following(self) -> &'static [Stage] {
        match self.ordinal() {
            Some(idx) => &Self::SEQUENCE[idx + 1..],
            None => &[],
        }
    }

    /// Name of the task that moves a document into this stage.
    pub fn task_name(self) -> Option<&'static str> {
        match self {
            Stage::Captured => Some("capture"),
            Stage::Contextualized => Some("contextualize"),
            Stage::Clarified => Some("clarify"),
            Stage::Categorized => Some("categorize"),
            Stage::Crystallized => Some("crystallize"),
            Stage::Connected => Some("connect"),
            Stage::Created | Stage::Error => None,
        }
    }

    /// Returns true for the absorbing error stage.
    pub fn is_error(self) -> bool {
        self == Stage::Error
    }

    /// Returns true for the last stage of the sequence.
    pub fn is_final(self) -> bool {
        self == Stage::Connected
    }

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Created => "CREATED",
            Stage::Captured => "CAPTURED",
            Stage::Contextualized => "CONTEXTUALIZED",
            Stage::Clarified => "CLARIFIED",
            Stage::Categorized => "CATEGORIZED",
            Stage::Crystallized => "CRYSTALLIZED",
            Stage::Connected => "CONNECTED",
            Stage::Error => "ERROR",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATED" => Ok(Stage::Created),
            "CAPTURED" => Ok(Stage::Captured),
            "CONTEXTUALIZED" => Ok(Stage::Contextualized),
            "CLARIFIED" => Ok(Stage::Clarified),
            "CATEGORIZED" => Ok(Stage::Categorized),
            "CRYSTALLIZED" => Ok(Stage::Crystallized),
            "CONNECTED" => Ok(Stage::Connected),
            "ERROR" => Ok(Stage::Error),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}

// ============================================================================
// Document
// ============================================================================

/// Coarse processing status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Error,
}

/// One entry of a document's processing history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub stage: Stage,
    pub timestamp: DateTime<Utc>,
}

/// A unit of content moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque unique identifier.
    pub id: String,
    /// Raw content, never modified after ingestion.
    pub content: String,
    /// Free-form metadata (original filename, source, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Append-only log of stages reached.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Payload produced by each completed stage.
    #[serde(default)]
    pub stage_results: BTreeMap<Stage, serde_json::Value>,
    #[serde(default)]
    pub status: DocumentStatus,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: serde_json::Map::new(),
            history: Vec::new(),
            stage_results: BTreeMap::new(),
            status: DocumentStatus::Pending,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Records a completed stage and its payload.
    ///
    /// Recording a stage again replaces the earlier entry and payload.
    pub fn record_stage(&mut self, stage: Stage, payload: Option<serde_json::Value>) {
        self.history.retain(|entry| entry.stage != stage);
        self.stage_results.remove(&stage);
        self.history.push(HistoryEntry {
            stage,
            timestamp: Utc::now(),
        });
        if let Some(payload) = payload {
            self.stage_results.insert(stage, payload);
        }
    }

    /// Returns the payload of a completed stage, if any.
    pub fn stage_result(&self, stage: Stage) -> Option<&serde_json::Value> {
        self.stage_results.get(&stage)
    }
}

/// SHA-256 hex digest of document content.
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

// ============================================================================
// State
// ============================================================================

/// Immutable record of a stage change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_stage: Stage,
    pub to_stage: Stage,
    /// Agent that performed the transition.
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Time-bounded exclusive lock on a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub holder_agent_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub lock_id: String,
}

impl Lock {
    /// Returns true once `expires_at` has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_held_by(&self, agent_id: &str) -> bool {
        self.holder_agent_id == agent_id
    }
}

/// Structured description of the failure that moved a document to `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stage whose task failed.
    pub stage: Stage,
    /// Name of the originating task.
    pub task: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorInfo {
    pub fn new(stage: Stage, task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            task: task.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Durable processing record of a document.
///
/// The last transition, when present, always ends at `current_stage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    pub document_id: String,
    pub current_stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_stage: Option<Stage>,
    #[serde(default)]
    pub transition_history: Vec<StateTransition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<Lock>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Incremented on every persisted mutation.
    pub version: u64,
}

impl DocumentState {
    /// Fresh state at `Created` with no history.
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            current_stage: Stage::Created,
            previous_stage: None,
            transition_history: Vec::new(),
            lock: None,
            metadata: serde_json::Map::new(),
            last_updated: Utc::now(),
            error_info: None,
            content_hash: None,
            version: 1,
        }
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// The lock, if one is set and not yet expired.
    pub fn active_lock(&self) -> Option<&Lock> {
        self.lock.as_ref().filter(|lock| !lock.is_expired())
    }

    /// Marks a persisted mutation.
    pub fn touch(&mut self) {
        self.version += 1;
        self.last_updated = Utc::now();
    }

    /// Checks that the history ends at the current stage and never moves
    /// backwards except into `Error`.
    pub fn history_is_consistent(&self) -> bool {
        if let Some(last) = self.transition_history.last() {
            if last.to_stage != self.current_stage {
                return false;
            }
        }
        self.transition_history.iter().all(|t| {
            t.to_stage.is_error()
                || match (t.from_stage.ordinal(), t.to_stage.ordinal()) {
                    (Some(from), Some(to)) => to > from,
                    _ => false,
                }
        })
    }
}
