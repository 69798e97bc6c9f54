use std::sync::Arc;
use docflow_core::{
    Config, IngestionQueue, PipelineOrchestrator, SanitizedConfig, StateStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn StateStore>,
    orchestrator: Arc<PipelineOrchestrator>,
    queue: Arc<IngestionQueue>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn StateStore>,
        orchestrator: Arc<PipelineOrchestrator>,
        queue: Arc<IngestionQueue>,
    ) -> Self {
        Self {
            config,
            store,
            orchestrator,
            queue,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    pub fn queue(&self) -> &IngestionQueue {
        &self.queue
    }
}
