//! Socket termination on credential revocation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use lumen_core::events::{DomainEvent, DomainTopic, SessionEvent};

use super::DomainConsumer;
use crate::connection::{CloseReason, ConnectionPool};

/// Close every local connection authenticated with `credential_id`.
///
/// Returns the number of connections closed.
pub fn terminate_credential(pool: &ConnectionPool, credential_id: Uuid) -> usize {
    let connections = pool.credential_connections(credential_id);
    for handle in &connections {
        info!(
            conn_id = %handle.id,
            key = %handle.key,
            credential_id = %credential_id,
            "Terminating connection of revoked credential"
        );
        handle.close(CloseReason::Revoked);
    }
    connections.len()
}

/// Closes local sockets whose credential was revoked on any process.
#[derive(Debug, Clone)]
pub struct RevocationTerminator {
    pool: Arc<ConnectionPool>,
}

impl RevocationTerminator {
    /// Create a terminator over this process's connections.
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DomainConsumer for RevocationTerminator {
    fn name(&self) -> &'static str {
        "revocation_terminator"
    }

    fn topics(&self) -> &'static [DomainTopic] {
        &[DomainTopic::Revocation]
    }

    async fn handle(&self, event: &DomainEvent) {
        if let SessionEvent::CredentialRevoked { credential_id, .. } = &event.payload {
            terminate_credential(&self.pool, *credential_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use lumen_core::events::RevocationReason;
    use lumen_core::types::{Guard, SubjectId};

    use super::*;
    use crate::connection::handle::tests::handle;

    #[tokio::test]
    async fn test_only_connections_of_revoked_credential_close() {
        let pool = Arc::new(ConnectionPool::new());
        let (a, _ra) = handle(1, "dev1", 4);
        let (b, _rb) = handle(1, "dev2", 4);
        pool.insert(a.clone(), 5);
        pool.insert(b.clone(), 5);

        let terminator = RevocationTerminator::new(pool);
        terminator
            .handle(&DomainEvent::new(SessionEvent::CredentialRevoked {
                subject_id: SubjectId(1),
                credential_id: a.credential_id,
                guard: Guard::Api,
                reason: RevocationReason::Logout,
            }))
            .await;

        assert_eq!(a.close_reason(), Some(CloseReason::Revoked));
        assert!(!b.is_closed());
    }
}
