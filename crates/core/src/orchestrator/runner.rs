//! Pipeline orchestrator implementation.
//!
//! Runs one document at a time per call; concurrency across documents is
//! up to the caller. Per-document exclusion comes from the lock manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::document::{content_hash, Document, DocumentState, DocumentStatus, ErrorInfo, Stage};
use crate::lock::LockManager;
use crate::store::StateStore;
use crate::task::{TaskOutcome, TaskRegistry, TaskRunner};
use crate::tracker::StateTracker;

use super::config::OrchestratorConfig;
use super::hooks::{HookPoint, HookRegistry};
use super::types::{OrchestratorError, OrchestratorStatus, ProcessOutcome, RunStatus};

/// The pipeline orchestrator - drives documents through the stage sequence.
pub struct PipelineOrchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn StateStore>,
    locks: Arc<LockManager>,
    tracker: StateTracker,
    runner: TaskRunner,
    hooks: HookRegistry,
    sweep_interval: Duration,

    // Runtime state
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn StateStore>,
        locks: Arc<LockManager>,
        registry: TaskRegistry,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let tracker = StateTracker::with_policy(Arc::clone(&store), config.transition_policy());

        Self {
            config,
            store,
            locks,
            tracker,
            runner: TaskRunner::new(registry),
            hooks: HookRegistry::new(),
            sweep_interval: Duration::from_secs(60),
            running: AtomicBool::new(false),
            shutdown_tx,
            sweeper: Mutex::new(None),
        }
    }

    /// Set how often the expiry sweeper runs once started.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.config.agent_id
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Start background work: reconcile durable locks and spawn the sweeper.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return Ok(());
        }

        info!("Starting pipeline orchestrator (agent {})", self.config.agent_id);

        // Rebuild the lock cache from durable records left by a previous run
        if let Err(e) = self.locks.reconcile() {
            self.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        let handle = self
            .locks
            .spawn_sweeper(self.sweep_interval, self.shutdown_tx.subscribe());
        *self.sweeper.lock().await = Some(handle);

        info!("Pipeline orchestrator started");
        Ok(())
    }

    /// Stop the sweeper and wait for it to exit.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping pipeline orchestrator");

        // Signal shutdown to the sweeper
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.sweeper.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Lock sweeper task failed: {}", e);
            }
        }

        info!("Pipeline orchestrator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Get current orchestrator status.
    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            running: self.is_running(),
            agent_id: self.config.agent_id.clone(),
            registered_stages: self.runner.registry().stages(),
            tracked_locks: self.locks.tracked_count(),
        }
    }

    /// Drive a document forward from its current stage.
    ///
    /// Stops after `end_stage` (default: the final stage), or at the first
    /// task failure, which moves the document to `Error`. Stages the
    /// document has already reached are skipped, as are stages without a
    /// registered task.
    ///
    /// Nothing is written before the first lock is granted: a document seen
    /// for the first time is recorded under that lock. Returns
    /// [`OrchestratorError::Lock`] without side effects when another run
    /// holds the document lock.
    pub async fn process(
        &self,
        document: &Document,
        end_stage: Option<Stage>,
    ) -> Result<ProcessOutcome, OrchestratorError> {
        let agent_id = self.config.agent_id.as_str();
        let hash = content_hash(&document.content);
        let initial = self
            .tracker
            .get(&document.id)?
            .unwrap_or_else(|| DocumentState::new(&document.id).with_content_hash(&hash));

        // The stored record carries payloads of stages completed earlier
        let (mut doc, mut doc_stored) = match self.store.get_document(&document.id)? {
            Some(stored) => (stored, true),
            None => (document.clone(), false),
        };

        if initial.current_stage.is_error() {
            debug!("Document {} is in ERROR, skipping", doc.id);
            return Ok(ProcessOutcome {
                document: doc,
                state: initial,
                status: RunStatus::Skipped,
                stages_run: Vec::new(),
            });
        }

        let end = end_stage
            .filter(|s| !s.is_error())
            .unwrap_or(Stage::Connected);
        let mut stages_run = Vec::new();
        let mut errored = false;

        for &next in initial.current_stage.following() {
            if next > end {
                break;
            }

            let Some(task_name) = next.task_name() else {
                continue;
            };
            if !self.runner.registry().contains(next) {
                warn!(
                    "No task registered for {} ({}), skipping for document {}",
                    next, task_name, doc.id
                );
                continue;
            }

            let guard = self.locks.acquire_guard(&doc.id, agent_id, None)?;

            // First sight: record hash and content now that the lock is ours
            let current = self.tracker.get_or_create(&doc.id, Some(&hash))?;
            if !doc_stored {
                self.store.put_document(&doc)?;
                doc_stored = true;
            }

            // Another run may have advanced the document before we got the lock
            if current.current_stage.is_error() {
                guard.release()?;
                errored = true;
                break;
            }
            if current.current_stage >= next {
                debug!(
                    "Document {} already at {}, skipping {}",
                    doc.id, current.current_stage, next
                );
                guard.release()?;
                continue;
            }

            let run = self.runner.run(next, &doc).await?;

            match run.outcome {
                TaskOutcome::Succeeded { payload } => {
                    // Payload is durable before the stage is; a failed write
                    // leaves the stage to be rerun
                    doc.record_stage(next, payload);
                    doc.status = if next.is_final() {
                        DocumentStatus::Completed
                    } else {
                        DocumentStatus::Processing
                    };
                    self.store.put_document(&doc)?;
                    self.tracker.transition(
                        &doc.id,
                        next,
                        agent_id,
                        Some(format!("Completed {} task", run.task_name)),
                    )?;
                    guard.release()?;

                    stages_run.push(next);
                    self.hooks.fire(HookPoint::Stage(next), &doc);
                }
                TaskOutcome::Failed { message } | TaskOutcome::Faulted { message } => {
                    error!(
                        "Task '{}' failed for document {}: {}",
                        run.task_name, doc.id, message
                    );
                    doc.status = DocumentStatus::Error;
                    self.store.put_document(&doc)?;
                    let info = ErrorInfo::new(next, &run.task_name, &message);
                    self.tracker.transition_to_error(&doc.id, agent_id, info)?;
                    guard.release()?;

                    self.hooks.fire(HookPoint::Error, &doc);
                    errored = true;
                    break;
                }
            }
        }

        // Absent only when no stage ever took the lock
        let state = self.tracker.get(&doc.id)?.unwrap_or(initial);

        let status = if errored {
            RunStatus::Errored
        } else if stages_run.is_empty() {
            RunStatus::Skipped
        } else if state.current_stage.is_final() {
            RunStatus::Completed
        } else {
            RunStatus::Advanced
        };

        info!(
            "Document {} run finished at {} ({:?}, {} stages)",
            doc.id,
            state.current_stage,
            status,
            stages_run.len()
        );

        Ok(ProcessOutcome {
            document: doc,
            state,
            status,
            stages_run,
        })
    }
}
