//! Ingestion queue implementation.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::orchestrator::PipelineOrchestrator;

use super::config::IngestionConfig;
use super::handler::IngestionHandler;
use super::types::{IncomingDocument, IngestError, IngestionStats};

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    processed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Decrements the in-flight count however the document task ends.
struct InFlight(Arc<Counters>);

impl InFlight {
    fn enter(counters: &Arc<Counters>) -> Self {
        counters.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counters))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared state of the per-document tasks.
struct Worker {
    config: IngestionConfig,
    orchestrator: Arc<PipelineOrchestrator>,
    handler: Arc<dyn IngestionHandler>,
    counters: Arc<Counters>,
}

impl Worker {
    /// Size check, orchestrator run with retries, then outcome handling.
    async fn handle(self: Arc<Self>, incoming: IncomingDocument) {
        let _in_flight = InFlight::enter(&self.counters);

        let size = incoming.size();
        if !self.config.accepts_size(size) {
            let error = IngestError::SizeLimitExceeded {
                size,
                min: self.config.min_file_size_bytes,
                max: self.config.max_file_size_bytes(),
            };
            warn!("Rejecting document {}: {}", incoming.id, error);
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            metrics::INGEST_DOCUMENTS
                .with_label_values(&["rejected"])
                .inc();
            self.handler.on_failed(&incoming, &error).await;
            return;
        }

        let document = incoming.to_document();
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                "Processing document {} (attempt {}/{})",
                document.id, attempt, max_attempts
            );

            match self.orchestrator.process(&document, None).await {
                Ok(outcome) => {
                    if outcome.state.current_stage.is_final() {
                        self.counters.processed.fetch_add(1, Ordering::SeqCst);
                        metrics::INGEST_DOCUMENTS
                            .with_label_values(&["processed"])
                            .inc();
                        info!("Successfully processed document {}", document.id);
                    } else {
                        self.counters.failed.fetch_add(1, Ordering::SeqCst);
                        metrics::INGEST_DOCUMENTS
                            .with_label_values(&["failed"])
                            .inc();
                        warn!(
                            "Document processing incomplete: {} at {}",
                            document.id, outcome.state.current_stage
                        );
                    }
                    self.handler.on_processed(&outcome).await;
                    return;
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        "Error processing document {} (attempt {}/{}): {}; retrying in {:?}",
                        document.id, attempt, max_attempts, e, delay
                    );
                    metrics::INGEST_RETRIES.inc();
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        "Failed to process document {} after {} attempts: {}",
                        document.id, attempt, e
                    );
                    self.counters.failed.fetch_add(1, Ordering::SeqCst);
                    metrics::INGEST_DOCUMENTS
                        .with_label_values(&["failed"])
                        .inc();
                    let error = IngestError::ProcessingFailed {
                        attempts: attempt,
                        message: e.to_string(),
                    };
                    self.handler.on_failed(&incoming, &error).await;
                    return;
                }
            }
        }
    }
}

/// Bounded queue feeding documents to the orchestrator.
pub struct IngestionQueue {
    worker: Arc<Worker>,
    tx: mpsc::Sender<IncomingDocument>,
    /// Held here while the drain loop is not running.
    rx: Mutex<Option<mpsc::Receiver<IncomingDocument>>>,
    drain: Mutex<Option<JoinHandle<mpsc::Receiver<IncomingDocument>>>>,

    // Runtime state
    running: AtomicBool,
    accepting: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl IngestionQueue {
    pub fn new(
        mut config: IngestionConfig,
        orchestrator: Arc<PipelineOrchestrator>,
        handler: Arc<dyn IngestionHandler>,
    ) -> Self {
        // A zero interval or batch would panic or stall the drain loop
        if config.interval_seconds == 0 {
            warn!("ingestion.interval_seconds is 0, draining every second");
            config.interval_seconds = 1;
        }
        if config.batch_size == 0 {
            warn!("ingestion.batch_size is 0, dispatching one document per tick");
            config.batch_size = 1;
        }
        let (tx, rx) = mpsc::channel(config.max_queue_size.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            worker: Arc::new(Worker {
                config,
                orchestrator,
                handler,
                counters: Arc::new(Counters::default()),
            }),
            tx,
            rx: Mutex::new(Some(rx)),
            drain: Mutex::new(None),
            running: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.worker.config
    }

    /// Queue a document without waiting for capacity.
    ///
    /// Returns the document id. A full queue is reported to the handler
    /// and returned as [`IngestError::QueueFull`].
    pub async fn enqueue(&self, document: IncomingDocument) -> Result<String, IngestError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(IngestError::NotRunning);
        }

        let id = document.id.clone();
        match self.tx.try_send(document) {
            Ok(()) => {
                metrics::QUEUE_DEPTH.set(self.queue_size() as i64);
                debug!("Queued document {}", id);
                Ok(id)
            }
            Err(mpsc::error::TrySendError::Full(document)) => {
                self.worker.counters.rejected.fetch_add(1, Ordering::SeqCst);
                metrics::QUEUE_REJECTIONS.inc();
                warn!(
                    "Ingestion queue full ({}), refusing document {}",
                    self.worker.config.max_queue_size, id
                );
                self.worker.handler.on_queue_full(&document).await;
                Err(IngestError::QueueFull {
                    max: self.worker.config.max_queue_size,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(IngestError::NotRunning),
        }
    }

    /// Documents waiting in the queue.
    pub fn queue_size(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> IngestionStats {
        let counters = &self.worker.counters;
        IngestionStats {
            running: self.is_running(),
            queue_size: self.queue_size(),
            max_queue_size: self.worker.config.max_queue_size,
            in_flight: counters.in_flight.load(Ordering::SeqCst),
            processed: counters.processed.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            rejected: counters.rejected.load(Ordering::SeqCst),
        }
    }

    /// Start the drain loop.
    pub async fn start(&self) {
        let Some(rx) = self.rx.lock().await.take() else {
            warn!("Ingestion queue already running");
            return;
        };

        info!(
            "Starting ingestion queue (batch {}, every {:?})",
            self.worker.config.batch_size,
            self.worker.config.interval()
        );

        self.accepting.store(true, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(drain_loop(
            Arc::clone(&self.worker),
            rx,
            self.shutdown_tx.subscribe(),
        ));
        *self.drain.lock().await = Some(handle);
    }

    /// Stop draining and wait for in-flight documents.
    ///
    /// Documents still running after the shutdown grace period are
    /// cancelled; their lock guards release on drop. Queued documents stay
    /// queued for a later `start`.
    pub async fn stop(&self) {
        self.accepting.store(false, Ordering::SeqCst);

        let Some(handle) = self.drain.lock().await.take() else {
            warn!("Ingestion queue not running");
            return;
        };

        info!("Stopping ingestion queue");
        let _ = self.shutdown_tx.send(());

        match handle.await {
            Ok(rx) => *self.rx.lock().await = Some(rx),
            Err(e) => error!("Ingestion drain loop failed: {}", e),
        }
        self.running.store(false, Ordering::SeqCst);
        info!("Ingestion queue stopped");
    }
}

async fn drain_loop(
    worker: Arc<Worker>,
    mut rx: mpsc::Receiver<IncomingDocument>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> mpsc::Receiver<IncomingDocument> {
    let mut tasks = JoinSet::new();
    let mut ticker = tokio::time::interval(worker.config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Ingestion drain loop started");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Ingestion drain loop received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                reap(&mut tasks);

                let mut dispatched = 0;
                while dispatched < worker.config.batch_size {
                    match rx.try_recv() {
                        Ok(document) => {
                            tasks.spawn(Arc::clone(&worker).handle(document));
                            dispatched += 1;
                        }
                        Err(_) => break,
                    }
                }

                metrics::QUEUE_DEPTH.set(rx.len() as i64);
                if dispatched > 0 {
                    debug!("Dispatched {} documents ({} in flight)", dispatched, tasks.len());
                }
            }
        }
    }

    if !tasks.is_empty() {
        let grace = worker.config.shutdown_grace();
        info!(
            "Waiting up to {:?} for {} in-flight documents",
            grace,
            tasks.len()
        );
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!("Cancelling {} in-flight documents", tasks.len());
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }

    info!("Ingestion drain loop stopped");
    rx
}

/// Collect finished document tasks, logging any that panicked.
fn reap(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            if e.is_panic() {
                error!("Document task panicked: {}", e);
            }
        }
    }
}
