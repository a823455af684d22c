//! Individual client connection handle.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use lumen_core::types::{ClientInstanceId, Guard, SubjectId};

use crate::message::OutboundFrame;

/// Unique connection identifier
pub type ConnectionId = Uuid;

/// `(subject, client instance)`: the identity of a connection across
/// the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionKey {
    /// Owner of the connection.
    pub subject_id: SubjectId,
    /// Device or tab of the owner.
    pub instance: ClientInstanceId,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject_id, self.instance)
    }
}

/// Who is opening a connection, as established by the session guard.
#[derive(Debug, Clone)]
pub struct ConnectionIdentity {
    /// Owner of the connection.
    pub subject_id: SubjectId,
    /// Device or tab of the owner.
    pub instance: ClientInstanceId,
    /// Credential the connection was authenticated with.
    pub credential_id: Uuid,
    /// Guard of that credential.
    pub guard: Guard,
}

/// Why a connection was closed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The outbound queue overflowed.
    SlowConsumer,
    /// The same client instance connected again.
    Replaced,
    /// The subject exceeded its connection cap; oldest goes first.
    Evicted,
    /// The credential behind the connection was revoked.
    Revoked,
    /// Nothing was received for longer than the idle timeout.
    IdleTimeout,
    /// The client went away.
    ClientClosed,
    /// The process is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Label sent in the close frame.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlowConsumer => "slow_consumer",
            Self::Replaced => "replaced",
            Self::Evicted => "evicted",
            Self::Revoked => "revoked",
            Self::IdleTimeout => "idle_timeout",
            Self::ClientClosed => "client_closed",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of queueing a frame on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The frame is queued behind everything enqueued before it.
    Queued,
    /// The connection is closing; the frame was dropped.
    Closed,
    /// The queue was full; the connection has been closed.
    SlowConsumer,
}

/// A handle to a single client connection.
///
/// Holds the bounded sender feeding the connection's writer task and the
/// cancellation token shared by its reader and writer.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Subject and client instance
    pub key: ConnectionKey,
    /// Credential the connection was authenticated with
    pub credential_id: Uuid,
    /// Guard of that credential
    pub guard: Guard,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundFrame>,
    cancel: CancellationToken,
    close_reason: Mutex<Option<CloseReason>>,
    last_activity_ms: AtomicI64,
}

impl ConnectionHandle {
    /// Create a new connection handle
    pub fn new(
        identity: ConnectionIdentity,
        sender: mpsc::Sender<OutboundFrame>,
        cancel: CancellationToken,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            key: ConnectionKey {
                subject_id: identity.subject_id,
                instance: identity.instance,
            },
            credential_id: identity.credential_id,
            guard: identity.guard,
            connected_at: now,
            sender,
            cancel,
            close_reason: Mutex::new(None),
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    /// Owner of the connection.
    pub fn subject_id(&self) -> SubjectId {
        self.key.subject_id
    }

    /// Queue a frame for the writer without waiting.
    ///
    /// A full queue means the client is not keeping up: the connection is
    /// closed rather than letting the queue grow or blocking the sender.
    pub fn enqueue(&self, frame: OutboundFrame) -> EnqueueOutcome {
        if self.is_closed() {
            return EnqueueOutcome::Closed;
        }
        match self.sender.try_send(frame) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    conn_id = %self.id,
                    subject_id = %self.key.subject_id,
                    instance = %self.key.instance,
                    "Outbound queue full, disconnecting slow consumer"
                );
                self.close(CloseReason::SlowConsumer);
                EnqueueOutcome::SlowConsumer
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close(CloseReason::ClientClosed);
                EnqueueOutcome::Closed
            }
        }
    }

    /// Close the connection. The first reason wins.
    pub fn close(&self, reason: CloseReason) {
        if let Ok(mut slot) = self.close_reason.lock() {
            slot.get_or_insert(reason);
        }
        self.cancel.cancel();
    }

    /// Why the connection was closed, if it was.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.lock().ok().and_then(|slot| *slot)
    }

    /// Check if the connection is closing or closed
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    /// Update last activity timestamp
    pub fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Last time the client sent anything.
    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity_ms.load(Ordering::Relaxed))
            .unwrap_or(self.connected_at)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn handle(
        subject: i64,
        instance: &str,
        capacity: usize,
    ) -> (std::sync::Arc<ConnectionHandle>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let identity = ConnectionIdentity {
            subject_id: SubjectId(subject),
            instance: ClientInstanceId::new(instance).unwrap(),
            credential_id: Uuid::new_v4(),
            guard: Guard::Api,
        };
        (
            std::sync::Arc::new(ConnectionHandle::new(identity, tx, CancellationToken::new())),
            rx,
        )
    }

    #[tokio::test]
    async fn test_full_queue_closes_connection() {
        let (conn, mut rx) = handle(1, "dev1", 2);
        assert_eq!(conn.enqueue(OutboundFrame::Ping), EnqueueOutcome::Queued);
        assert_eq!(conn.enqueue(OutboundFrame::Ping), EnqueueOutcome::Queued);
        assert_eq!(conn.enqueue(OutboundFrame::Ping), EnqueueOutcome::SlowConsumer);

        assert!(conn.is_closed());
        assert_eq!(conn.close_reason(), Some(CloseReason::SlowConsumer));
        assert_eq!(conn.enqueue(OutboundFrame::Ping), EnqueueOutcome::Closed);

        // Frames queued before the overflow are still there, in order.
        assert_eq!(rx.recv().await, Some(OutboundFrame::Ping));
    }

    #[test]
    fn test_first_close_reason_wins() {
        let (conn, _rx) = handle(1, "dev1", 2);
        conn.close(CloseReason::Revoked);
        conn.close(CloseReason::Shutdown);
        assert_eq!(conn.close_reason(), Some(CloseReason::Revoked));
    }
}
