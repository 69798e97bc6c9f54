//! Ingestion queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the ingestion queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Queue capacity; enqueues beyond it fail with `QueueFull`.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Documents dispatched per drain tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Time between drain ticks (seconds).
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,

    /// Processing attempts per document before it is handed to failure handling.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit (milliseconds); the delay after attempt `n` is `n * retry_backoff_ms`.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Smallest accepted document (bytes).
    #[serde(default = "default_min_size")]
    pub min_file_size_bytes: u64,

    /// Largest accepted document (megabytes).
    #[serde(default = "default_max_size_mb")]
    pub max_file_size_mb: u64,

    /// How long `stop` waits for in-flight documents before cancelling them (seconds).
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_max_queue_size() -> usize {
    100
}

fn default_batch_size() -> usize {
    10
}

fn default_interval() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    2000
}

fn default_min_size() -> u64 {
    10
}

fn default_max_size_mb() -> u64 {
    10
}

fn default_shutdown_grace() -> u64 {
    30
}

impl IngestionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Delay before the attempt following attempt number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Returns true when `size` lies within the accepted range.
    pub fn accepts_size(&self, size: u64) -> bool {
        size >= self.min_file_size_bytes && size <= self.max_file_size_bytes()
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            batch_size: default_batch_size(),
            interval_seconds: default_interval(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            min_file_size_bytes: default_min_size(),
            max_file_size_mb: default_max_size_mb(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}
