//! Event bus: routed deliveries to one process and domain broadcasts to
//! every process.
//!
//! Two kinds of topic ride on the same pub/sub provider:
//!
//! - `comet:node:{process}` carries [`RoutedDelivery`] messages addressed
//!   to the process that owns the target sockets. Only that process
//!   subscribes.
//! - `domain:{topic}` carries [`DomainEvent`]s. Every interested process
//!   subscribes and runs its own consumers.
//!
//! Delivery is at-least-once and best effort. A message published while
//! nobody listens is gone; undecodable messages are logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::warn;
use uuid::Uuid;

use lumen_cache::keys;
use lumen_core::events::{DomainEvent, DomainTopic};
use lumen_core::result::AppResult;
use lumen_core::traits::{DomainEventPublisher, PubSubProvider};
use lumen_core::types::ProcessId;

use crate::connection::ConnectionKey;

/// A pre-serialized event for a set of sockets owned by one process.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoutedDelivery {
    /// Id of the event being delivered.
    pub id: Uuid,
    /// Process that resolved the recipients.
    pub origin: ProcessId,
    /// Sockets to write to on the receiving process.
    pub targets: Vec<ConnectionKey>,
    /// The serialized event, written to each socket verbatim.
    pub event: Box<RawValue>,
}

/// Publishes and subscribes to routed and domain topics.
#[derive(Debug, Clone)]
pub struct EventBus {
    pubsub: Arc<dyn PubSubProvider>,
    process_id: ProcessId,
}

impl EventBus {
    /// Create a bus for this process.
    pub fn new(pubsub: Arc<dyn PubSubProvider>, process_id: ProcessId) -> Self {
        Self { pubsub, process_id }
    }

    /// This process.
    pub fn process_id(&self) -> &ProcessId {
        &self.process_id
    }

    /// Send a delivery to the process owning its targets.
    ///
    /// Returns the number of subscribers reached; zero means the owner is
    /// gone and the delivery was lost.
    pub async fn publish_routed(
        &self,
        destination: &ProcessId,
        delivery: &RoutedDelivery,
    ) -> AppResult<u64> {
        let payload = serde_json::to_vec(delivery)?;
        self.pubsub
            .publish(&keys::routed_topic(destination), Bytes::from(payload))
            .await
    }

    /// Deliveries addressed to this process.
    pub async fn subscribe_routed(&self) -> AppResult<BoxStream<'static, RoutedDelivery>> {
        let stream = self
            .pubsub
            .subscribe(&keys::routed_topic(&self.process_id))
            .await?;
        Ok(stream
            .filter_map(|msg| async move {
                match serde_json::from_slice::<RoutedDelivery>(&msg.payload) {
                    Ok(delivery) => Some(delivery),
                    Err(e) => {
                        warn!(topic = %msg.topic, error = %e, "Dropping undecodable routed delivery");
                        None
                    }
                }
            })
            .boxed())
    }

    /// Broadcast a domain event on its topic.
    pub async fn publish_event(&self, event: &DomainEvent) -> AppResult<u64> {
        let payload = serde_json::to_vec(event)?;
        self.pubsub
            .publish(
                &keys::domain_topic(event.topic().as_str()),
                Bytes::from(payload),
            )
            .await
    }

    /// Domain events published on `topic` by any process.
    pub async fn subscribe_domain(
        &self,
        topic: DomainTopic,
    ) -> AppResult<BoxStream<'static, DomainEvent>> {
        let stream = self
            .pubsub
            .subscribe(&keys::domain_topic(topic.as_str()))
            .await?;
        Ok(stream
            .filter_map(|msg| async move {
                match serde_json::from_slice::<DomainEvent>(&msg.payload) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!(topic = %msg.topic, error = %e, "Dropping undecodable domain event");
                        None
                    }
                }
            })
            .boxed())
    }
}

#[async_trait]
impl DomainEventPublisher for EventBus {
    async fn publish_domain(&self, event: &DomainEvent) -> AppResult<()> {
        self.publish_event(event).await.map(|_| ())
    }
}
