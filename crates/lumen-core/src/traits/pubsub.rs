//! Topic-based publish/subscribe trait.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::result::AppResult;

/// A message received from a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    /// Topic the message was published on (without store prefix).
    pub topic: String,
    /// Raw payload bytes, exactly as published.
    pub payload: Bytes,
}

/// Best-effort, at-least-once topic messaging shared by every process.
///
/// Publishing never waits for subscribers. A failed publish is returned to
/// the caller and is never retried by the provider.
#[async_trait]
pub trait PubSubProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Publish a payload on a topic. Returns the number of subscribers the
    /// backend handed the message to (zero is not an error).
    async fn publish(&self, topic: &str, payload: Bytes) -> AppResult<u64>;

    /// Subscribe to a topic. The stream ends when the backend connection
    /// is lost; callers decide whether to resubscribe.
    async fn subscribe(&self, topic: &str) -> AppResult<BoxStream<'static, PubSubMessage>>;
}
