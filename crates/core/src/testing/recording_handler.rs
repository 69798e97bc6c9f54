//! Ingestion handler that records outcomes for assertions.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::ingest::{IncomingDocument, IngestError, IngestionHandler};
use crate::orchestrator::ProcessOutcome;

/// Records every handler call.
///
/// # Example
///
/// ```rust,ignore
/// let handler = Arc::new(RecordingHandler::new());
/// let queue = IngestionQueue::new(config, orchestrator, handler.clone());
///
/// queue.start().await;
/// assert!(handler.wait_for_outcomes(1, Duration::from_secs(5)).await);
/// assert_eq!(handler.processed().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct RecordingHandler {
    processed: Mutex<Vec<ProcessOutcome>>,
    failed: Mutex<Vec<(IncomingDocument, IngestError)>>,
    queue_full: Mutex<Vec<IncomingDocument>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> Vec<ProcessOutcome> {
        self.processed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn failures(&self) -> Vec<(IncomingDocument, IngestError)> {
        self.failed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn queue_full_count(&self) -> usize {
        self.queue_full
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Number of terminal outcomes (processed or failed) seen so far.
    pub fn outcome_count(&self) -> usize {
        self.processed.lock().unwrap_or_else(|e| e.into_inner()).len()
            + self.failed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Poll until at least `count` terminal outcomes were recorded.
    ///
    /// Returns false on timeout.
    pub async fn wait_for_outcomes(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.outcome_count() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

#[async_trait]
impl IngestionHandler for RecordingHandler {
    async fn on_processed(&self, outcome: &ProcessOutcome) {
        self.processed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(outcome.clone());
    }

    async fn on_failed(&self, document: &IncomingDocument, error: &IngestError) {
        self.failed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((document.clone(), error.clone()));
    }

    async fn on_queue_full(&self, document: &IncomingDocument) {
        self.queue_full
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(document.clone());
    }
}
