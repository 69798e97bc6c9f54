//! Stage-to-task registry.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::document::Stage;

use super::traits::StageTask;

/// Errors returned by [`TaskRegistry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No task is registered for the stage.
    #[error("no task registered for stage {0}")]
    Unregistered(Stage),

    /// The stage is never entered through a task (`Created`, `Error`).
    #[error("stage {0} cannot have a task")]
    NotTaskStage(Stage),
}

/// Maps stages to the tasks that move documents into them.
///
/// Populated at startup and read-only afterwards.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    tasks: HashMap<Stage, Arc<dyn StageTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the task for a stage, replacing any previous one.
    pub fn register(
        &mut self,
        stage: Stage,
        task: Arc<dyn StageTask>,
    ) -> Result<(), RegistryError> {
        if stage.task_name().is_none() {
            return Err(RegistryError::NotTaskStage(stage));
        }
        self.tasks.insert(stage, task);
        Ok(())
    }

    /// Look up the task for a stage.
    pub fn get(&self, stage: Stage) -> Result<Arc<dyn StageTask>, RegistryError> {
        self.tasks
            .get(&stage)
            .cloned()
            .ok_or(RegistryError::Unregistered(stage))
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.tasks.contains_key(&stage)
    }

    /// Registered stages in pipeline order.
    pub fn stages(&self) -> Vec<Stage> {
        Stage::SEQUENCE
            .iter()
            .copied()
            .filter(|s| self.tasks.contains_key(s))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("stages", &self.stages())
            .finish()
    }
}
