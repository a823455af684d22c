//! Login notices pushed to a subject's live connections.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use lumen_core::events::{DomainEvent, DomainTopic, SessionEvent};
use lumen_core::types::{Guard, ProcessId};

use super::DomainConsumer;
use crate::connection::ConnectionPool;
use crate::message::{Event, EventKind, OutboundFrame};

#[derive(Debug, Serialize)]
struct LoginNotice<'a> {
    guard: Guard,
    ip_address: &'a str,
    platform: &'a str,
    user_agent: &'a str,
    at: DateTime<Utc>,
}

/// Tells a subject's open sockets that the subject logged in elsewhere.
///
/// Every process runs one over its own connections, so the notice reaches
/// every live device without routed delivery.
#[derive(Debug, Clone)]
pub struct LoginNotifier {
    pool: Arc<ConnectionPool>,
    process_id: ProcessId,
}

impl LoginNotifier {
    /// Create a notifier over this process's connections.
    pub fn new(pool: Arc<ConnectionPool>, process_id: ProcessId) -> Self {
        Self { pool, process_id }
    }
}

#[async_trait]
impl DomainConsumer for LoginNotifier {
    fn name(&self) -> &'static str {
        "login_notifier"
    }

    fn topics(&self) -> &'static [DomainTopic] {
        &[DomainTopic::Login]
    }

    async fn handle(&self, event: &DomainEvent) {
        let SessionEvent::LoginOccurred {
            subject_id,
            guard,
            ip_address,
            platform,
            user_agent,
        } = &event.payload
        else {
            return;
        };

        let connections = self.pool.subject_connections(*subject_id);
        if connections.is_empty() {
            return;
        }

        let notice = LoginNotice {
            guard: *guard,
            ip_address,
            platform,
            user_agent,
            at: event.timestamp,
        };
        let frame = match Event::from_json(EventKind::LoginNotice, &notice, self.process_id.clone())
            .and_then(|e| e.to_frame())
        {
            Ok(frame) => Arc::<str>::from(frame),
            Err(e) => {
                warn!(subject_id = %subject_id, error = %e, "Failed to build login notice");
                return;
            }
        };

        for handle in connections {
            handle.enqueue(OutboundFrame::Text(frame.clone()));
        }
        debug!(subject_id = %subject_id, "Login notice sent");
    }
}

#[cfg(test)]
mod tests {
    use lumen_core::types::SubjectId;

    use super::*;
    use crate::connection::handle::tests::handle;

    #[tokio::test]
    async fn test_notice_reaches_local_connections_of_subject() {
        let pool = Arc::new(ConnectionPool::new());
        let (mine, mut rx_mine) = handle(7, "dev1", 4);
        let (other, mut rx_other) = handle(8, "dev1", 4);
        pool.insert(mine, 5);
        pool.insert(other, 5);

        let notifier = LoginNotifier::new(pool, ProcessId::new("p1").unwrap());
        notifier
            .handle(&DomainEvent::new(SessionEvent::LoginOccurred {
                subject_id: SubjectId(7),
                guard: Guard::Api,
                ip_address: "10.0.0.1".to_string(),
                platform: "ios".to_string(),
                user_agent: "app/1.0".to_string(),
            }))
            .await;

        let Some(OutboundFrame::Text(text)) = rx_mine.recv().await else {
            panic!("expected a login notice");
        };
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["event"], "login_notice");
        assert_eq!(json["payload"]["platform"], "ios");
        assert!(rx_other.try_recv().is_err());
    }
}
