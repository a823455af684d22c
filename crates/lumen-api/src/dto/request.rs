//! Request DTOs with validation.

use serde::Deserialize;
use serde_json::value::RawValue;
use validator::Validate;

use lumen_realtime::EventKind;

/// Login request body.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    /// Username.
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    /// Password.
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    /// Client platform label (web, ios, android, ...).
    #[serde(default)]
    #[validate(length(max = 32))]
    pub platform: String,
}

/// Conversation kinds a message can be published to.
pub const TALK_PRIVATE: i32 = 1;
/// Group conversation.
pub const TALK_GROUP: i32 = 2;

/// Publish an event to a conversation.
#[derive(Debug, Deserialize, Validate)]
pub struct PublishRequest {
    /// `1` for a private conversation, `2` for a group.
    #[validate(range(min = 1, max = 2, message = "talk_type must be 1 or 2"))]
    pub talk_type: i32,
    /// Peer subject id or group id.
    #[validate(range(min = 1, message = "receiver_id must be positive"))]
    pub receiver_id: i64,
    /// Event kind; defaults to a chat message.
    #[serde(default = "default_kind")]
    pub event: EventKind,
    /// Opaque payload delivered as is.
    pub payload: Box<RawValue>,
}

fn default_kind() -> EventKind {
    EventKind::TalkMessage
}
