pub mod config;
pub mod document;
pub mod ingest;
pub mod llm;
pub mod lock;
pub mod metrics;
pub mod orchestrator;
pub mod store;
pub mod task;
pub mod testing;
pub mod tracker;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use document::{
    content_hash, Document, DocumentState, DocumentStatus, ErrorInfo, Lock, Stage,
    StateTransition,
};
pub use ingest::{
    IncomingDocument, IngestError, IngestionConfig, IngestionHandler, IngestionQueue,
    IngestionStats, LoggingHandler,
};
pub use llm::{build_llm_registry, LlmClient, LlmConfig, LlmError, LlmStageTask, OllamaClient};
pub use lock::{LockConfig, LockError, LockGuard, LockManager};
pub use orchestrator::{
    HookPoint, HookRegistry, OrchestratorConfig, OrchestratorError, OrchestratorStatus,
    PipelineOrchestrator, ProcessOutcome, RunStatus,
};
pub use store::{InMemoryStateStore, SqliteStateStore, StateFilter, StateStore, StoreError};
pub use task::{
    RegistryError, StageTask, TaskError, TaskOutcome, TaskRegistry, TaskResult, TaskRunner,
};
pub use tracker::{StateTracker, TransitionError, TransitionPolicy};
