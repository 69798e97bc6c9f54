//! Outcome handlers for the ingestion queue.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::orchestrator::ProcessOutcome;

use super::types::{IncomingDocument, IngestError};

/// Receives terminal outcomes from the ingestion queue.
///
/// Each document produces at most one `on_processed` or `on_failed`
/// call. Implementations do archival, alerting and the like.
#[async_trait]
pub trait IngestionHandler: Send + Sync {
    /// The orchestrator finished a run (completed or moved to `Error`).
    async fn on_processed(&self, _outcome: &ProcessOutcome) {}

    /// The document was rejected for size or faulted on every attempt.
    async fn on_failed(&self, _document: &IncomingDocument, _error: &IngestError) {}

    /// An enqueue was refused because the queue was full.
    async fn on_queue_full(&self, _document: &IncomingDocument) {}
}

/// Handler that only logs outcomes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

#[async_trait]
impl IngestionHandler for LoggingHandler {
    async fn on_processed(&self, outcome: &ProcessOutcome) {
        info!(
            "Document {} finished at {} ({:?})",
            outcome.document.id, outcome.state.current_stage, outcome.status
        );
    }

    async fn on_failed(&self, document: &IncomingDocument, error: &IngestError) {
        warn!("Document {} failed: {}", document.id, error);
    }

    async fn on_queue_full(&self, document: &IncomingDocument) {
        warn!("Ingestion queue full, refused document {}", document.id);
    }
}
