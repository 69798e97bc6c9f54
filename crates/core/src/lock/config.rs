//! Lock configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for document locks and the expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lifetime of a lock grant when no TTL is given (seconds).
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u64,

    /// How often expired locks are swept (seconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_ttl() -> u64 {
    600 // 10 minutes
}

fn default_sweep_interval() -> u64 {
    60
}

impl LockConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}
