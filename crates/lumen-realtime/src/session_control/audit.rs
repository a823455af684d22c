//! Session audit trail.

use async_trait::async_trait;
use tracing::info;

use lumen_core::events::{DomainEvent, DomainTopic, SessionEvent};
use lumen_core::types::ProcessId;

use super::DomainConsumer;

/// Logs every session event seen by this process.
#[derive(Debug, Clone)]
pub struct SessionAudit {
    process_id: ProcessId,
}

impl SessionAudit {
    /// Create an audit consumer for this process.
    pub fn new(process_id: ProcessId) -> Self {
        Self { process_id }
    }
}

#[async_trait]
impl DomainConsumer for SessionAudit {
    fn name(&self) -> &'static str {
        "session_audit"
    }

    fn topics(&self) -> &'static [DomainTopic] {
        &DomainTopic::ALL
    }

    async fn handle(&self, event: &DomainEvent) {
        match &event.payload {
            SessionEvent::LoginOccurred {
                subject_id,
                guard,
                ip_address,
                platform,
                ..
            } => info!(
                event_id = %event.id,
                process_id = %self.process_id,
                subject_id = %subject_id,
                guard = %guard,
                ip_address = %ip_address,
                platform = %platform,
                "Session audit: login"
            ),
            SessionEvent::CredentialRevoked {
                subject_id,
                credential_id,
                guard,
                reason,
            } => info!(
                event_id = %event.id,
                process_id = %self.process_id,
                subject_id = %subject_id,
                credential_id = %credential_id,
                guard = %guard,
                reason = ?reason,
                "Session audit: credential revoked"
            ),
        }
    }
}
