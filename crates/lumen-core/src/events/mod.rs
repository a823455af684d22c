//! Domain events broadcast between Lumen processes.
//!
//! Domain events travel on well-known broadcast topics. They are consumed
//! by zero or more workers (audit, login notices, socket termination);
//! publishers never wait for consumers.

pub mod session;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use session::{RevocationReason, SessionEvent};

/// Well-known domain broadcast topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainTopic {
    /// A subject logged in.
    Login,
    /// A credential was revoked.
    Revocation,
}

impl DomainTopic {
    /// All topics, in a stable order.
    pub const ALL: [DomainTopic; 2] = [DomainTopic::Login, DomainTopic::Revocation];

    /// Topic name on the shared bus (without store prefix).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "session.login",
            Self::Revocation => "session.revoked",
        }
    }
}

impl fmt::Display for DomainTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wrapper for all domain events with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique event ID.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub payload: SessionEvent,
}

impl DomainEvent {
    /// Create a new domain event.
    pub fn new(payload: SessionEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// The topic this event is published on.
    pub fn topic(&self) -> DomainTopic {
        match self.payload {
            SessionEvent::LoginOccurred { .. } => DomainTopic::Login,
            SessionEvent::CredentialRevoked { .. } => DomainTopic::Revocation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Guard, SubjectId};

    #[test]
    fn test_topic_follows_payload() {
        let login = DomainEvent::new(SessionEvent::LoginOccurred {
            subject_id: SubjectId(7),
            guard: Guard::Api,
            ip_address: "127.0.0.1".to_string(),
            platform: "web".to_string(),
            user_agent: "test".to_string(),
        });
        assert_eq!(login.topic(), DomainTopic::Login);

        let revoked = DomainEvent::new(SessionEvent::CredentialRevoked {
            subject_id: SubjectId(7),
            credential_id: Uuid::new_v4(),
            guard: Guard::Admin,
            reason: RevocationReason::Logout,
        });
        assert_eq!(revoked.topic(), DomainTopic::Revocation);
        assert_eq!(revoked.payload.subject_id(), SubjectId(7));
    }

    #[test]
    fn test_wire_shape_is_tagged() {
        let event = SessionEvent::CredentialRevoked {
            subject_id: SubjectId(1),
            credential_id: Uuid::nil(),
            guard: Guard::Api,
            reason: RevocationReason::Refresh,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "credential_revoked");
        assert_eq!(json["reason"], "refresh");
        assert_eq!(json["guard"], "api");
    }
}
