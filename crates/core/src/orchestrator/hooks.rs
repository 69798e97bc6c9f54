//! Stage and error hook registry.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::document::{Document, Stage};

/// Point in a run at which hooks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// After a successful transition into the stage.
    Stage(Stage),
    /// After a transition into `Error`.
    Error,
}

impl HookPoint {
    pub fn name(&self) -> &'static str {
        match self {
            HookPoint::Stage(stage) => stage.as_str(),
            HookPoint::Error => "error",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Callback invoked with the updated document.
///
/// Hooks run synchronously on the orchestrator's task and must not block.
pub type StageHook = Arc<dyn Fn(&Document) -> anyhow::Result<()> + Send + Sync>;

/// Hooks keyed by [`HookPoint`], fired in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<HookPoint, Vec<StageHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, point: HookPoint, hook: F)
    where
        F: Fn(&Document) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(point)
            .or_default()
            .push(Arc::new(hook));
    }

    /// Number of hooks registered for a point.
    pub fn count(&self, point: HookPoint) -> usize {
        self.hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&point)
            .map_or(0, Vec::len)
    }

    /// Run every hook for `point`, returning how many failed.
    ///
    /// Errors and panics are logged and never stop the remaining hooks.
    pub fn fire(&self, point: HookPoint, document: &Document) -> usize {
        let hooks: Vec<StageHook> = match self
            .hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&point)
        {
            Some(hooks) => hooks.clone(),
            None => return 0,
        };

        let mut failures = 0;
        for (idx, hook) in hooks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| hook(document))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(
                        "Hook #{} for '{}' failed on document {}: {:#}",
                        idx, point, document.id, e
                    );
                }
                Err(_) => {
                    failures += 1;
                    warn!(
                        "Hook #{} for '{}' panicked on document {}",
                        idx, point, document.id
                    );
                }
            }
        }

        debug!(
            "Fired {} '{}' hooks for document {} ({} failed)",
            hooks.len(),
            point,
            document.id,
            failures
        );
        failures
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks = self.hooks.read().unwrap_or_else(|e| e.into_inner());
        let counts: HashMap<&'static str, usize> =
            hooks.iter().map(|(k, v)| (k.name(), v.len())).collect();
        f.debug_struct("HookRegistry").field("hooks", &counts).finish()
    }
}
