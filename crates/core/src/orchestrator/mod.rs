//! Pipeline orchestrator: drives documents through the stage sequence.
//!
//! For each stage the orchestrator takes the document lock, runs the
//! stage task, records the transition and fires hooks. The lock is held
//! by a [`LockGuard`](crate::lock::LockGuard) so it is released on every
//! exit path.

mod config;
mod hooks;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use hooks::{HookPoint, HookRegistry, StageHook};
pub use runner::PipelineOrchestrator;
pub use types::{OrchestratorError, OrchestratorStatus, ProcessOutcome, RunStatus};
