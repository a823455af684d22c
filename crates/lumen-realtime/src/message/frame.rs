//! Frames exchanged with client sockets.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use lumen_core::types::SubjectId;

/// Messages sent by the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Application-level ping, answered with `pong`.
    Ping,
    /// Acknowledge receipt of an event.
    Ack {
        /// The acknowledged event id.
        message_id: Uuid,
    },
    /// Typing indicator for a peer.
    Keyboard {
        /// The subject being typed to.
        to_subject: SubjectId,
    },
}

/// What the socket reader hands to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// A text frame.
    Text(String),
    /// Any other sign of life (pong, binary, protocol ping).
    Activity,
    /// The client closed the socket.
    Close,
}

/// What the socket writer sends to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A serialized event, shared between every connection it goes to.
    Text(Arc<str>),
    /// Protocol-level keepalive ping.
    Ping,
    /// Close the socket with a reason.
    Close(String),
}

impl OutboundFrame {
    /// The application-level `pong` reply.
    pub fn pong() -> Self {
        Self::Text(Arc::from(r#"{"event":"pong"}"#))
    }

    /// An application-level error notice.
    pub fn error(message: &str) -> Self {
        let body = serde_json::json!({ "event": "error", "data": { "message": message } });
        Self::Text(Arc::from(body.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inbound() {
        let ping: InboundMessage = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(ping, InboundMessage::Ping);

        let kb: InboundMessage =
            serde_json::from_str(r#"{"event":"keyboard","data":{"to_subject":43}}"#).unwrap();
        assert_eq!(
            kb,
            InboundMessage::Keyboard {
                to_subject: SubjectId(43)
            }
        );

        assert!(serde_json::from_str::<InboundMessage>(r#"{"event":"subscribe"}"#).is_err());
    }
}
