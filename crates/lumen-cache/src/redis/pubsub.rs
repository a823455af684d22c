//! Redis pub/sub for multi-node deployments.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use redis::AsyncCommands;
use tracing::debug;

use lumen_core::result::AppResult;
use lumen_core::traits::pubsub::{PubSubMessage, PubSubProvider};

use super::client::RedisClient;

/// Redis pub/sub bridge for cross-node message relay.
///
/// Publishing goes through the shared connection manager; each
/// subscription opens its own dedicated connection, as Redis requires.
#[derive(Debug, Clone)]
pub struct RedisPubSub {
    client: RedisClient,
}

impl RedisPubSub {
    /// Create a new Redis pub/sub bridge.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PubSubProvider for RedisPubSub {
    async fn publish(&self, topic: &str, payload: Bytes) -> AppResult<u64> {
        let channel = self.client.prefixed_key(topic);
        let mut conn = self.client.conn_mut();
        let receivers: u64 = conn
            .publish(&channel, payload.as_ref())
            .await
            .map_err(RedisClient::map_err)?;
        Ok(receivers)
    }

    async fn subscribe(&self, topic: &str) -> AppResult<BoxStream<'static, PubSubMessage>> {
        let channel = self.client.prefixed_key(topic);
        let mut pubsub = self
            .client
            .client()
            .get_async_pubsub()
            .await
            .map_err(RedisClient::map_err)?;
        pubsub
            .subscribe(&channel)
            .await
            .map_err(RedisClient::map_err)?;
        debug!(channel = %channel, "Subscribed to Redis channel");

        let client = self.client.clone();
        let stream = pubsub.into_on_message().map(move |msg| PubSubMessage {
            topic: client.strip_prefix(msg.get_channel_name()).to_string(),
            payload: Bytes::copy_from_slice(msg.get_payload_bytes()),
        });
        Ok(stream.boxed())
    }
}
