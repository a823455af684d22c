//! Events delivered to client connections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use uuid::Uuid;

use lumen_core::result::AppResult;
use lumen_core::types::{ClientInstanceId, ProcessId, SubjectId};

/// Closed set of event kinds a client can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A chat message.
    TalkMessage,
    /// A typing indicator.
    Keyboard,
    /// The subject logged in somewhere else.
    LoginNotice,
    /// A server notice.
    System,
}

/// An event on its way to one or more connections.
///
/// The payload is opaque to this layer and is carried byte for byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event id.
    pub id: Uuid,
    /// What kind of event this is.
    #[serde(rename = "event")]
    pub kind: EventKind,
    /// Opaque payload.
    pub payload: Box<RawValue>,
    /// Process that created the event.
    pub origin: ProcessId,
    /// When the event was created.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Create an event with a pre-serialized payload.
    pub fn new(kind: EventKind, payload: Box<RawValue>, origin: ProcessId) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            origin,
            created_at: Utc::now(),
        }
    }

    /// Create an event by serializing `payload`.
    pub fn from_json<T: Serialize>(
        kind: EventKind,
        payload: &T,
        origin: ProcessId,
    ) -> AppResult<Self> {
        Ok(Self::new(
            kind,
            serde_json::value::to_raw_value(payload)?,
            origin,
        ))
    }

    /// Serialize the event into the text frame written to sockets.
    pub fn to_frame(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Who an event is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientSelector {
    /// Every connection of one subject.
    Subject(SubjectId),
    /// Every connection of several subjects.
    Subjects(Vec<SubjectId>),
    /// One connection of one subject.
    Instance(SubjectId, ClientInstanceId),
    /// Every member of a group, resolved through a group directory.
    Group(i64),
}
