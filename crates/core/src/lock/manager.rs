//! Lock manager implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::document::{DocumentState, Lock};
use crate::metrics;
use crate::store::{StateStore, StoreError};

use super::guard::LockGuard;
use super::types::LockError;

/// Default lock lifetime.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(600);

/// Grants, refreshes, releases and sweeps document locks.
pub struct LockManager {
    store: Arc<dyn StateStore>,
    default_ttl: Duration,
    table: Mutex<HashMap<String, Lock>>,
}

fn held(document_id: &str, lock: &Lock) -> LockError {
    metrics::LOCK_ACQUISITIONS.with_label_values(&["held"]).inc();
    LockError::Held {
        document_id: document_id.to_string(),
        holder: lock.holder_agent_id.clone(),
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
    now + ttl
}

impl LockManager {
    /// Create a lock manager with the default TTL.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self::with_ttl(store, DEFAULT_LOCK_TTL)
    }

    /// Create a lock manager with a custom default TTL.
    pub fn with_ttl(store: Arc<dyn StateStore>, default_ttl: Duration) -> Self {
        Self {
            store,
            default_ttl,
            table: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Lock>> {
        // A panic while holding the table cannot leave a half-written entry.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Acquire an exclusive lock on a document.
    ///
    /// Any unexpired lock refuses the grant, including one held by the same
    /// agent: a holder must release before acquiring again. Expired locks
    /// (in the cache or in the store) are reclaimed on the spot. A document
    /// without a state record gets a fresh one at `Created` so the lock is
    /// durable.
    pub fn acquire(
        &self,
        document_id: &str,
        agent_id: &str,
        ttl: Option<Duration>,
    ) -> Result<Lock, LockError> {
        let mut table = self.table();
        let now = Utc::now();

        if let Some(cached) = table.get(document_id) {
            if !cached.is_expired_at(now) {
                return Err(held(document_id, cached));
            }
        }

        let (mut state, existed) = match self.store.get_state(document_id)? {
            Some(state) => (state, true),
            None => (DocumentState::new(document_id), false),
        };

        if let Some(existing) = &state.lock {
            if !existing.is_expired_at(now) {
                table.insert(document_id.to_string(), existing.clone());
                return Err(held(document_id, existing));
            }
            info!(
                "Reclaiming expired lock {} on {} (held by {})",
                existing.lock_id, document_id, existing.holder_agent_id
            );
        }

        let lock = Lock {
            holder_agent_id: agent_id.to_string(),
            acquired_at: now,
            expires_at: expiry(now, ttl.unwrap_or(self.default_ttl)),
            lock_id: uuid::Uuid::new_v4().to_string(),
        };

        state.lock = Some(lock.clone());
        if existed {
            state.touch();
        }
        self.store.put_state(&state)?;
        table.insert(document_id.to_string(), lock.clone());

        metrics::LOCK_ACQUISITIONS.with_label_values(&["acquired"]).inc();
        debug!("Lock {} acquired on {} by {}", lock.lock_id, document_id, agent_id);
        Ok(lock)
    }

    /// Acquire a lock wrapped in a guard that releases it when dropped.
    pub fn acquire_guard(
        self: &Arc<Self>,
        document_id: &str,
        agent_id: &str,
        ttl: Option<Duration>,
    ) -> Result<LockGuard, LockError> {
        let lock = self.acquire(document_id, agent_id, ttl)?;
        Ok(LockGuard::new(Arc::clone(self), document_id, agent_id, lock))
    }

    /// Release a lock. Releasing an unlocked document succeeds.
    pub fn release(&self, document_id: &str, agent_id: &str) -> Result<(), LockError> {
        let mut table = self.table();

        let Some(mut state) = self.store.get_state(document_id)? else {
            table.remove(document_id);
            return Ok(());
        };

        match &state.lock {
            None => {
                table.remove(document_id);
                Ok(())
            }
            Some(lock) if !lock.is_held_by(agent_id) => Err(LockError::Mismatch {
                document_id: document_id.to_string(),
                holder: lock.holder_agent_id.clone(),
                agent_id: agent_id.to_string(),
            }),
            Some(lock) => {
                debug!("Lock {} released on {} by {}", lock.lock_id, document_id, agent_id);
                state.lock = None;
                state.touch();
                self.store.put_state(&state)?;
                table.remove(document_id);
                Ok(())
            }
        }
    }

    /// Release one specific grant.
    ///
    /// Returns `false` without touching anything when the document's lock
    /// is no longer `lock_id` (it expired and was reclaimed, or was never
    /// set).
    pub fn release_grant(&self, document_id: &str, lock_id: &str) -> Result<bool, LockError> {
        let mut table = self.table();

        if table
            .get(document_id)
            .is_some_and(|cached| cached.lock_id == lock_id)
        {
            table.remove(document_id);
        }

        let Some(mut state) = self.store.get_state(document_id)? else {
            return Ok(false);
        };
        match &state.lock {
            Some(current) if current.lock_id == lock_id => {
                debug!("Lock {} released on {}", lock_id, document_id);
                state.lock = None;
                state.touch();
                self.store.put_state(&state)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Extend a live lock by the default TTL.
    pub fn refresh(&self, document_id: &str, agent_id: &str) -> Result<Lock, LockError> {
        let mut table = self.table();
        let now = Utc::now();

        let mut state = self
            .store
            .get_state(document_id)?
            .ok_or_else(|| LockError::NotLocked(document_id.to_string()))?;

        let lock = match &state.lock {
            Some(lock) if !lock.is_expired_at(now) => lock,
            _ => return Err(LockError::NotLocked(document_id.to_string())),
        };

        if !lock.is_held_by(agent_id) {
            return Err(LockError::Mismatch {
                document_id: document_id.to_string(),
                holder: lock.holder_agent_id.clone(),
                agent_id: agent_id.to_string(),
            });
        }

        let refreshed = Lock {
            expires_at: expiry(now, self.default_ttl),
            ..lock.clone()
        };
        state.lock = Some(refreshed.clone());
        state.touch();
        self.store.put_state(&state)?;
        table.insert(document_id.to_string(), refreshed.clone());

        debug!("Lock {} on {} refreshed until {}", refreshed.lock_id, document_id, refreshed.expires_at);
        Ok(refreshed)
    }

    /// The live lock on a document, as seen by the in-memory table.
    pub fn current(&self, document_id: &str) -> Option<Lock> {
        self.table()
            .get(document_id)
            .filter(|lock| !lock.is_expired())
            .cloned()
    }

    /// Number of locks tracked in memory (expired ones included until swept).
    pub fn tracked_count(&self) -> usize {
        self.table().len()
    }

    /// Clear every expired lock from the table and the store.
    ///
    /// Returns the number of locks removed. Store failures are logged and
    /// the entry is left for the next sweep.
    pub fn sweep_expired(&self) -> usize {
        let mut table = self.table();
        let now = Utc::now();

        let expired: Vec<(String, Lock)> = table
            .iter()
            .filter(|(_, lock)| lock.is_expired_at(now))
            .map(|(id, lock)| (id.clone(), lock.clone()))
            .collect();

        let mut swept = 0;
        for (document_id, lock) in expired {
            match self.clear_durable(&document_id, &lock) {
                Ok(()) => {
                    table.remove(&document_id);
                    swept += 1;
                    info!(
                        "Swept expired lock {} on {} (held by {})",
                        lock.lock_id, document_id, lock.holder_agent_id
                    );
                }
                Err(e) => {
                    error!("Failed to clear expired lock on {}: {}", document_id, e);
                }
            }
        }

        if swept > 0 {
            metrics::LOCKS_SWEPT.inc_by(swept as u64);
        }
        swept
    }

    /// Remove the durable lock record if it is still the one we tracked.
    fn clear_durable(&self, document_id: &str, lock: &Lock) -> Result<(), StoreError> {
        let Some(mut state) = self.store.get_state(document_id)? else {
            return Ok(());
        };
        match &state.lock {
            Some(current) if current.lock_id == lock.lock_id => {
                state.lock = None;
                state.touch();
                self.store.put_state(&state)
            }
            _ => Ok(()),
        }
    }

    /// Rebuild the in-memory table from durable lock records.
    ///
    /// Returns the number of locks loaded. Expired ones are loaded too so
    /// the next sweep clears them.
    pub fn reconcile(&self) -> Result<usize, LockError> {
        let locked = self.store.list_locked()?;
        let mut table = self.table();
        let mut loaded = 0;
        for state in locked {
            if let Some(lock) = state.lock {
                table.insert(state.document_id, lock);
                loaded += 1;
            }
        }
        if loaded > 0 {
            info!("Reconciled {} durable locks into lock table", loaded);
        }
        Ok(loaded)
    }

    /// Spawn the periodic expiry sweep.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            info!("Lock sweeper started (interval {:?})", interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Lock sweeper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let swept = manager.sweep_expired();
                        if swept > 0 {
                            warn!("Lock sweeper reclaimed {} expired locks", swept);
                        }
                    }
                }
            }
            info!("Lock sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStateStore;
    use tokio_test::{assert_err, assert_ok};

    fn create_manager() -> (Arc<InMemoryStateStore>, Arc<LockManager>) {
        let store = Arc::new(InMemoryStateStore::new());
        let manager = Arc::new(LockManager::new(store.clone()));
        (store, manager)
    }

    #[test]
    fn test_acquire_persists_lock() {
        let (store, manager) = create_manager();
        let lock = manager.acquire("doc-1", "agent-a", None).unwrap();

        assert_eq!(lock.holder_agent_id, "agent-a");
        let state = store.get_state("doc-1").unwrap().unwrap();
        assert_eq!(state.lock.as_ref().unwrap().lock_id, lock.lock_id);
        assert_eq!(manager.current("doc-1").unwrap().lock_id, lock.lock_id);
    }

    #[test]
    fn test_acquire_held_by_other_agent() {
        let (_store, manager) = create_manager();
        manager.acquire("doc-1", "agent-a", None).unwrap();
        assert_err!(manager.acquire("doc-1", "agent-b", None));

        let result = manager.acquire("doc-1", "agent-b", None);
        match result {
            Err(LockError::Held { holder, .. }) => assert_eq!(holder, "agent-a"),
            other => panic!("expected Held, got {:?}", other),
        }
    }

    #[test]
    fn test_acquire_held_by_same_agent() {
        let (_store, manager) = create_manager();
        let first = manager.acquire("D1", "pipeline", None).unwrap();

        match manager.acquire("D1", "pipeline", None) {
            Err(LockError::Held { holder, .. }) => assert_eq!(holder, "pipeline"),
            other => panic!("expected Held, got {:?}", other),
        }
        assert_eq!(manager.current("D1").unwrap().lock_id, first.lock_id);

        manager.release("D1", "pipeline").unwrap();
        assert_ok!(manager.acquire("D1", "pipeline", None));
    }

    #[test]
    fn test_release_grant_matches_lock_id() {
        let (store, manager) = create_manager();
        let lock = manager.acquire("doc-1", "agent-a", None).unwrap();

        assert!(!manager.release_grant("doc-1", "some-other-grant").unwrap());
        assert!(manager.current("doc-1").is_some());

        assert!(manager.release_grant("doc-1", &lock.lock_id).unwrap());
        assert!(manager.current("doc-1").is_none());
        assert!(store.get_state("doc-1").unwrap().unwrap().lock.is_none());
        assert!(!manager.release_grant("never-seen", &lock.lock_id).unwrap());
    }

    #[test]
    fn test_acquire_reclaims_expired_lock() {
        let (_store, manager) = create_manager();
        manager
            .acquire("doc-1", "agent-a", Some(Duration::ZERO))
            .unwrap();

        let lock = manager.acquire("doc-1", "agent-b", None).unwrap();
        assert_eq!(lock.holder_agent_id, "agent-b");
    }

    #[test]
    fn test_acquire_sees_durable_lock_without_cache() {
        let store = Arc::new(InMemoryStateStore::new());
        let first = LockManager::new(store.clone());
        first.acquire("doc-1", "agent-a", None).unwrap();

        // A fresh manager (as after a restart) still honours the durable lock.
        let second = LockManager::new(store);
        assert!(matches!(
            second.acquire("doc-1", "agent-b", None),
            Err(LockError::Held { .. })
        ));
    }

    #[test]
    fn test_release() {
        let (store, manager) = create_manager();
        manager.acquire("doc-1", "agent-a", None).unwrap();

        manager.release("doc-1", "agent-a").unwrap();
        assert!(store.get_state("doc-1").unwrap().unwrap().lock.is_none());
        assert!(manager.current("doc-1").is_none());

        // Idempotent
        assert_ok!(manager.release("doc-1", "agent-a"));
        assert_ok!(manager.release("never-seen", "agent-a"));
    }

    #[test]
    fn test_release_mismatch() {
        let (_store, manager) = create_manager();
        manager.acquire("doc-1", "agent-a", None).unwrap();

        assert!(matches!(
            manager.release("doc-1", "agent-b"),
            Err(LockError::Mismatch { .. })
        ));
        assert!(manager.current("doc-1").is_some());
    }

    #[test]
    fn test_refresh_extends_expiry() {
        let store = Arc::new(InMemoryStateStore::new());
        let manager = LockManager::with_ttl(store, Duration::from_secs(60));
        let lock = manager
            .acquire("doc-1", "agent-a", Some(Duration::from_secs(1)))
            .unwrap();

        let refreshed = manager.refresh("doc-1", "agent-a").unwrap();
        assert_eq!(refreshed.lock_id, lock.lock_id);
        assert!(refreshed.expires_at > lock.expires_at);
    }

    #[test]
    fn test_refresh_errors() {
        let (_store, manager) = create_manager();
        assert!(matches!(
            manager.refresh("doc-1", "agent-a"),
            Err(LockError::NotLocked(_))
        ));

        manager.acquire("doc-1", "agent-a", None).unwrap();
        assert!(matches!(
            manager.refresh("doc-1", "agent-b"),
            Err(LockError::Mismatch { .. })
        ));

        manager
            .acquire("doc-2", "agent-a", Some(Duration::ZERO))
            .unwrap();
        assert!(matches!(
            manager.refresh("doc-2", "agent-a"),
            Err(LockError::NotLocked(_))
        ));
    }

    #[test]
    fn test_sweep_expired() {
        let (store, manager) = create_manager();
        manager
            .acquire("stale", "agent-a", Some(Duration::ZERO))
            .unwrap();
        manager.acquire("live", "agent-a", None).unwrap();

        assert_eq!(manager.sweep_expired(), 1);
        assert_eq!(manager.tracked_count(), 1);
        assert!(store.get_state("stale").unwrap().unwrap().lock.is_none());
        assert!(store.get_state("live").unwrap().unwrap().lock.is_some());

        assert_eq!(manager.sweep_expired(), 0);
    }

    #[test]
    fn test_reconcile_loads_durable_locks() {
        let store = Arc::new(InMemoryStateStore::new());
        let first = LockManager::new(store.clone());
        first
            .acquire("doc-1", "crashed-agent", Some(Duration::ZERO))
            .unwrap();

        let second = LockManager::new(store.clone());
        assert_eq!(second.reconcile().unwrap(), 1);
        assert_eq!(second.sweep_expired(), 1);
        assert!(store.get_state("doc-1").unwrap().unwrap().lock.is_none());
    }

    #[test]
    fn test_concurrent_acquire_single_winner() {
        let (_store, manager) = create_manager();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    manager
                        .acquire("contended", &format!("agent-{}", i), None)
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_sweeper_loop_reclaims_and_stops() {
        let (store, manager) = create_manager();
        manager
            .acquire("doc-1", "agent-a", Some(Duration::ZERO))
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = manager.spawn_sweeper(Duration::from_millis(10), shutdown_rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get_state("doc-1").unwrap().unwrap().lock.is_none());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
