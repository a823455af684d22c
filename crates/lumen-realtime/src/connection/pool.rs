//! Connection pool: every connection this process owns, indexed by
//! subject and by connection id.
//!
//! Both indexes are `DashMap`s, so operations on different subjects never
//! contend on one lock, and no guard is ever held across an await.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use lumen_core::types::SubjectId;

use super::handle::{CloseReason, ConnectionHandle, ConnectionId, ConnectionKey};

/// Thread-safe pool of all local connections.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    /// Subject → connections, oldest first.
    by_subject: DashMap<SubjectId, Vec<Arc<ConnectionHandle>>>,
    /// Connection ID → connection handle for direct lookup.
    by_id: DashMap<ConnectionId, Arc<ConnectionHandle>>,
}

impl ConnectionPool {
    /// Creates a new empty connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection, displacing the previous connection of the same
    /// instance and, past `max_per_subject`, the subject's oldest ones.
    ///
    /// Displaced handles are returned with the reason they must be closed
    /// for; they are no longer in the pool.
    pub fn insert(
        &self,
        handle: Arc<ConnectionHandle>,
        max_per_subject: usize,
    ) -> Vec<(Arc<ConnectionHandle>, CloseReason)> {
        let mut displaced = Vec::new();
        {
            let mut conns = self.by_subject.entry(handle.key.subject_id).or_default();
            if let Some(pos) = conns
                .iter()
                .position(|c| c.key.instance == handle.key.instance)
            {
                displaced.push((conns.remove(pos), CloseReason::Replaced));
            }
            while !conns.is_empty() && conns.len() >= max_per_subject.max(1) {
                displaced.push((conns.remove(0), CloseReason::Evicted));
            }
            conns.push(handle.clone());
        }
        for (old, _) in &displaced {
            self.by_id.remove(&old.id);
        }
        self.by_id.insert(handle.id, handle);
        displaced
    }

    /// Removes exactly this connection. Returns `false` if it had already
    /// been removed or displaced.
    pub fn remove(&self, handle: &ConnectionHandle) -> bool {
        if self.by_id.remove(&handle.id).is_none() {
            return false;
        }
        let subject = handle.key.subject_id;
        let now_empty = match self.by_subject.get_mut(&subject) {
            Some(mut conns) => {
                conns.retain(|c| c.id != handle.id);
                conns.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.by_subject.remove_if(&subject, |_, conns| conns.is_empty());
        }
        true
    }

    /// Whether this exact connection is still in the pool.
    pub fn contains(&self, handle: &ConnectionHandle) -> bool {
        self.by_id.contains_key(&handle.id)
    }

    /// The current connection for a key.
    pub fn get_by_key(&self, key: &ConnectionKey) -> Option<Arc<ConnectionHandle>> {
        self.by_subject.get(&key.subject_id).and_then(|conns| {
            conns
                .iter()
                .find(|c| c.key.instance == key.instance)
                .cloned()
        })
    }

    /// Gets a specific connection by ID.
    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.by_id.get(conn_id).map(|entry| entry.value().clone())
    }

    /// Gets all connections for a subject, oldest first.
    pub fn subject_connections(&self, subject_id: SubjectId) -> Vec<Arc<ConnectionHandle>> {
        self.by_subject
            .get(&subject_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Gets all connections authenticated with a credential.
    pub fn credential_connections(&self, credential_id: Uuid) -> Vec<Arc<ConnectionHandle>> {
        self.by_id
            .iter()
            .filter(|entry| entry.value().credential_id == credential_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Returns all connection handles.
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.by_id
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Returns total number of local connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Returns number of subjects with at least one local connection.
    pub fn subject_count(&self) -> usize {
        self.by_subject.len()
    }
}
