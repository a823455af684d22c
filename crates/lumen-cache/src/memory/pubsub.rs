//! In-memory pub/sub for single-node deployments and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tracing::warn;

use lumen_core::result::AppResult;
use lumen_core::traits::pubsub::{PubSubMessage, PubSubProvider};

/// In-memory pub/sub implementation.
///
/// Cloning shares the topic table, so several engines built on clones
/// of one `MemoryPubSub` see each other's messages.
#[derive(Debug, Clone)]
pub struct MemoryPubSub {
    /// Topic name → broadcast sender
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<PubSubMessage>>>>,
    /// Buffer size for topics
    buffer_size: usize,
}

impl MemoryPubSub {
    /// Create a new in-memory pub/sub
    pub fn new(buffer_size: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            buffer_size: buffer_size.max(1),
        }
    }
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl PubSubProvider for MemoryPubSub {
    async fn publish(&self, topic: &str, payload: Bytes) -> AppResult<u64> {
        let topics = self.topics.read().await;
        let Some(tx) = topics.get(topic) else {
            return Ok(0);
        };
        let msg = PubSubMessage {
            topic: topic.to_string(),
            payload,
        };
        Ok(tx.send(msg).map(|n| n as u64).unwrap_or(0))
    }

    async fn subscribe(&self, topic: &str) -> AppResult<BoxStream<'static, PubSubMessage>> {
        let rx = {
            let mut topics = self.topics.write().await;
            topics
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(self.buffer_size).0)
                .subscribe()
        };
        let topic = topic.to_string();

        let stream = stream::unfold(rx, move |mut rx| {
            let topic = topic.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(msg) => return Some((msg, rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(topic = %topic, skipped, "Pub/sub subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = MemoryPubSub::new(8);
        let n = bus.publish("t", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = MemoryPubSub::new(8);
        let mut a = bus.subscribe("t").await.unwrap();
        let mut b = bus.clone().subscribe("t").await.unwrap();

        for body in [&b"1"[..], b"2", b"3"] {
            let n = bus.publish("t", Bytes::copy_from_slice(body)).await.unwrap();
            assert_eq!(n, 2);
        }

        for stream in [&mut a, &mut b] {
            let got: Vec<_> = stream.by_ref().take(3).map(|m| m.payload).collect().await;
            assert_eq!(got, vec![Bytes::from("1"), Bytes::from("2"), Bytes::from("3")]);
        }
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = MemoryPubSub::new(8);
        let mut a = bus.subscribe("a").await.unwrap();
        bus.publish("b", Bytes::from_static(b"nope")).await.unwrap();
        bus.publish("a", Bytes::from_static(b"yes")).await.unwrap();
        let msg = a.next().await.unwrap();
        assert_eq!(msg.topic, "a");
        assert_eq!(msg.payload, Bytes::from_static(b"yes"));
    }
}
