//! Scoped lock release.

use std::sync::Arc;

use tracing::warn;

use crate::document::Lock;

use super::manager::LockManager;
use super::types::LockError;

/// Holds a document lock and releases it when dropped.
///
/// Dropping covers every exit path, including a cancelled future, so a
/// granted lock is never left behind by the holder. The guard only ever
/// clears its own grant: once that grant has expired and been reclaimed,
/// releasing is a no-op. Use [`LockGuard::release`] to observe the result.
pub struct LockGuard {
    manager: Arc<LockManager>,
    document_id: String,
    agent_id: String,
    lock: Lock,
    released: bool,
}

impl LockGuard {
    pub(super) fn new(
        manager: Arc<LockManager>,
        document_id: &str,
        agent_id: &str,
        lock: Lock,
    ) -> Self {
        Self {
            manager,
            document_id: document_id.to_string(),
            agent_id: agent_id.to_string(),
            lock,
            released: false,
        }
    }

    pub fn lock(&self) -> &Lock {
        &self.lock
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Extend the held lock by the manager's default TTL.
    pub fn refresh(&mut self) -> Result<&Lock, LockError> {
        let refreshed = self.manager.refresh(&self.document_id, &self.agent_id)?;
        if refreshed.lock_id != self.lock.lock_id {
            return Err(LockError::NotLocked(self.document_id.clone()));
        }
        self.lock = refreshed;
        Ok(&self.lock)
    }

    /// Release the lock now.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.release_grant()
    }

    fn release_grant(&self) -> Result<(), LockError> {
        let released = self
            .manager
            .release_grant(&self.document_id, &self.lock.lock_id)?;
        if !released {
            warn!(
                "Lock {} on {} was reclaimed before release",
                self.lock.lock_id, self.document_id
            );
        }
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.release_grant() {
            warn!(
                "Failed to release lock {} on {}: {}",
                self.lock.lock_id, self.document_id, e
            );
        }
    }
}
