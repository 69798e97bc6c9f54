//! Ingestion queue: bounded admission buffer in front of the orchestrator.
//!
//! Documents are enqueued without blocking and drained on a fixed timer in
//! batches. Each drained document is processed on its own task with size
//! admission checks and retry with linear backoff.

mod config;
mod handler;
mod queue;
mod types;

pub use config::IngestionConfig;
pub use handler::{IngestionHandler, LoggingHandler};
pub use queue::IngestionQueue;
pub use types::{IncomingDocument, IngestError, IngestionStats};
