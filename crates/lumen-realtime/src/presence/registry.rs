//! Presence registry: the local connection pool mirrored into the shared
//! directory.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use lumen_core::config::RealtimeConfig;
use lumen_core::error::AppError;
use lumen_core::result::AppResult;
use lumen_core::traits::CacheProvider;
use lumen_core::types::{ProcessId, SubjectId};

use super::directory::{PresenceDirectory, PresenceRecord};
use crate::connection::{ConnectionHandle, ConnectionKey, ConnectionPool};

/// Registers local connections and answers cluster-wide lookups.
#[derive(Debug)]
pub struct PresenceRegistry {
    process_id: ProcessId,
    pool: Arc<ConnectionPool>,
    directory: PresenceDirectory,
    max_per_subject: usize,
    /// Serializes shared-record writes per subject, so a heartbeat rewrite
    /// can never land after the unregister that deleted the record.
    subject_locks: DashMap<SubjectId, Arc<Mutex<()>>>,
}

impl PresenceRegistry {
    /// Create a registry for this process.
    pub fn new(
        process_id: ProcessId,
        store: Arc<dyn CacheProvider>,
        config: &RealtimeConfig,
    ) -> Self {
        Self {
            process_id,
            pool: Arc::new(ConnectionPool::new()),
            directory: PresenceDirectory::new(store, config.lease_ttl()),
            max_per_subject: config.max_connections_per_subject,
            subject_locks: DashMap::new(),
        }
    }

    /// This process.
    pub fn process_id(&self) -> &ProcessId {
        &self.process_id
    }

    /// Local connections.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// The shared directory.
    pub fn directory(&self) -> &PresenceDirectory {
        &self.directory
    }

    /// Register a connection: local table first, then the shared record.
    ///
    /// Connections displaced by this one (same instance, or oldest past the
    /// per-subject cap) are closed and returned. If the shared upsert fails
    /// the local insert is rolled back, the displaced records are removed
    /// and the error returned.
    pub async fn register(
        &self,
        handle: Arc<ConnectionHandle>,
    ) -> AppResult<Vec<Arc<ConnectionHandle>>> {
        let subject_id = handle.key.subject_id;
        let _guard = self.lock_subject(subject_id).await;

        let displaced = self.pool.insert(handle.clone(), self.max_per_subject);
        for (old, reason) in &displaced {
            info!(
                conn_id = %old.id,
                key = %old.key,
                reason = %reason,
                "Closing displaced connection"
            );
            old.close(*reason);
        }

        if let Err(e) = self
            .directory
            .upsert(subject_id, &self.process_id, &handle.key.instance)
            .await
        {
            self.pool.remove(&handle);
            // Nothing local backs the displaced keys any more, including
            // the one this connection failed to take over.
            for (old, _) in &displaced {
                self.remove_unbacked(&old.key).await;
            }
            return Err(e);
        }

        for (old, _) in &displaced {
            if old.key.instance != handle.key.instance {
                self.remove_unbacked(&old.key).await;
            }
        }

        debug!(conn_id = %handle.id, key = %handle.key, process_id = %self.process_id, "Registered");
        Ok(displaced.into_iter().map(|(old, _)| old).collect())
    }

    /// Unregister a connection: shared record first, then the local table.
    ///
    /// Only acts while `handle` is still the current connection for its key,
    /// so a replaced connection never deletes its successor's entries.
    /// Returns `false` if there was nothing to do.
    pub async fn unregister(&self, handle: &ConnectionHandle) -> AppResult<bool> {
        let subject_id = handle.key.subject_id;
        let removed = {
            let _guard = self.lock_subject(subject_id).await;
            if !self.pool.contains(handle) {
                return Ok(false);
            }
            let remote = self
                .directory
                .remove(subject_id, &self.process_id, &handle.key.instance)
                .await;
            self.pool.remove(handle);
            remote
        };
        self.forget_lock(subject_id);
        debug!(conn_id = %handle.id, key = %handle.key, "Unregistered");
        removed.map(|_| true)
    }

    /// Every live `(instance, process)` of a subject across the cluster.
    pub async fn lookup(&self, subject_id: SubjectId) -> AppResult<Vec<PresenceRecord>> {
        self.directory.lookup(subject_id).await
    }

    /// Renew this process's lease and rewrite every local record.
    ///
    /// Rewriting heals records lost to a store restart and keeps each
    /// subject's hash from expiring. Each rewrite holds the subject's lock
    /// and skips connections that left the pool since the snapshot.
    pub async fn heartbeat(&self) -> AppResult<()> {
        self.directory.renew_lease(&self.process_id).await?;

        let mut first_error: Option<AppError> = None;
        for handle in self.pool.all_connections() {
            let _guard = self.lock_subject(handle.key.subject_id).await;
            if !self.pool.contains(&handle) {
                continue;
            }
            if let Err(e) = self
                .directory
                .upsert(handle.key.subject_id, &self.process_id, &handle.key.instance)
                .await
            {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Remove a record this process owns but no longer backs with a
    /// connection. A key registered again in the meantime is left alone.
    pub async fn remove_record(&self, key: &ConnectionKey) {
        let _guard = self.lock_subject(key.subject_id).await;
        self.remove_unbacked(key).await;
    }

    /// Caller holds the subject lock.
    async fn remove_unbacked(&self, key: &ConnectionKey) {
        if self.pool.get_by_key(key).is_some() {
            return;
        }
        match self
            .directory
            .remove(key.subject_id, &self.process_id, &key.instance)
            .await
        {
            Ok(true) => warn!(key = %key, process_id = %self.process_id, "Removed stale presence record"),
            Ok(false) => {}
            Err(e) => warn!(key = %key, error = %e, "Failed to remove stale presence record"),
        }
    }

    async fn lock_subject(&self, subject_id: SubjectId) -> OwnedMutexGuard<()> {
        let lock = self
            .subject_locks
            .entry(subject_id)
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Drop a subject's lock once it has no local connections and no
    /// waiters.
    fn forget_lock(&self, subject_id: SubjectId) {
        if self.pool.subject_connections(subject_id).is_empty() {
            self.subject_locks
                .remove_if(&subject_id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }

    /// Drop this process's lease so peers stop routing here at once.
    pub async fn release(&self) -> AppResult<()> {
        self.directory.release_lease(&self.process_id).await
    }
}
