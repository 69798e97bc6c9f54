//! Time-bounded exclusive document locks.
//!
//! Locks are persisted on the document's state record and mirrored in an
//! in-memory table so expiry sweeps do not have to scan the store. The
//! table is a cache: [`LockManager::reconcile`] rebuilds it from the store
//! after a restart.
//!
//! This is a single-process mutual-exclusion mechanism. Two lock managers
//! sharing one store are not coordinated.

mod config;
mod guard;
mod manager;
mod types;

pub use config::LockConfig;
pub use guard::LockGuard;
pub use manager::{LockManager, DEFAULT_LOCK_TTL};
pub use types::LockError;
