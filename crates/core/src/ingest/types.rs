//! Types for the ingestion queue.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::Document;

/// Errors surfaced by the ingestion queue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    /// The queue is at capacity.
    #[error("ingestion queue is full ({max} documents)")]
    QueueFull { max: usize },

    /// The document is outside the accepted size range.
    #[error("document size {size} bytes is outside [{min}, {max}]")]
    SizeLimitExceeded { size: u64, min: u64, max: u64 },

    /// The queue has been stopped.
    #[error("ingestion queue is not running")]
    NotRunning,

    /// Every processing attempt faulted.
    #[error("processing failed after {attempts} attempts: {message}")]
    ProcessingFailed { attempts: u32, message: String },
}

/// A newly discovered document waiting for processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingDocument {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Size of the source file, when it differs from the content length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl IncomingDocument {
    /// New document with a generated id.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            metadata: serde_json::Map::new(),
            size_bytes: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    /// Size used for admission checks.
    pub fn size(&self) -> u64 {
        self.size_bytes.unwrap_or(self.content.len() as u64)
    }

    pub fn to_document(&self) -> Document {
        let mut document = Document::new(&self.id, &self.content);
        document.metadata = self.metadata.clone();
        document
    }
}

/// Snapshot of ingestion queue counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionStats {
    pub running: bool,
    /// Documents waiting in the queue.
    pub queue_size: usize,
    pub max_queue_size: usize,
    /// Documents dispatched and not yet finished.
    pub in_flight: usize,
    /// Documents that reached the final stage.
    pub processed: u64,
    /// Documents that ended in error, faulted on every attempt, or were
    /// rejected for size.
    pub failed: u64,
    /// Enqueue attempts refused because the queue was full.
    pub rejected: u64,
}
