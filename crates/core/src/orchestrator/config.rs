//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

use crate::tracker::TransitionPolicy;

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Agent identity used for lock grants and transition records.
    #[serde(default = "default_agent_id")]
    pub agent_id: String,

    /// Forbid skipping stages.
    /// When false, any strictly later stage is a valid transition target.
    #[serde(default)]
    pub strict_ordering: bool,
}

fn default_agent_id() -> String {
    "pipeline".to_string()
}

impl OrchestratorConfig {
    pub fn transition_policy(&self) -> TransitionPolicy {
        if self.strict_ordering {
            TransitionPolicy::Strict
        } else {
            TransitionPolicy::AllowSkips
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
            strict_ordering: false,
        }
    }
}
