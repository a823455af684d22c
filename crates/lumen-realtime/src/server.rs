//! Top-level real-time engine that ties together all subsystems.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{Sink, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use lumen_cache::StoreManager;
use lumen_core::config::RealtimeConfig;
use lumen_core::error::AppError;
use lumen_core::events::{DomainEvent, DomainTopic};
use lumen_core::result::AppResult;
use lumen_core::types::{ProcessId, SubjectId};

use crate::bridge::{EventBus, RoutedDelivery};
use crate::connection::{
    CloseReason, ConnectionHandle, ConnectionIdentity, WriterConfig, pump_outbound,
};
use crate::dispatch::{DeliveryDispatcher, GroupDirectory};
use crate::message::{
    ClientFrame, Event, EventKind, InboundMessage, OutboundFrame, RecipientSelector,
};
use crate::presence::PresenceRegistry;
use crate::session_control::{DomainConsumer, LoginNotifier, RevocationTerminator, SessionAudit};

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Counters reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// This process.
    pub process_id: ProcessId,
    /// Live local connections.
    pub connections: usize,
    /// Subjects with at least one local connection.
    pub subjects: usize,
}

#[derive(Debug, Serialize)]
struct KeyboardPayload {
    from_subject: SubjectId,
    to_subject: SubjectId,
}

/// Central real-time engine of one process.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// This process.
    pub process_id: ProcessId,
    /// Real-time settings.
    pub config: Arc<RealtimeConfig>,
    /// Local connections and shared presence.
    pub registry: Arc<PresenceRegistry>,
    /// Routed and domain messaging.
    pub bus: EventBus,
    /// Event delivery.
    pub dispatcher: Arc<DeliveryDispatcher>,
    consumers: Arc<Vec<Arc<dyn DomainConsumer>>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine")
            .field("process_id", &self.process_id)
            .finish()
    }
}

impl RealtimeEngine {
    /// Creates the engine and all subsystems. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(process_id: ProcessId, config: &RealtimeConfig, stores: &StoreManager) -> Self {
        let registry = Arc::new(PresenceRegistry::new(
            process_id.clone(),
            stores.store.clone(),
            config,
        ));
        let bus = EventBus::new(stores.pubsub.clone(), process_id.clone());
        let dispatcher = Arc::new(DeliveryDispatcher::new(registry.clone(), bus.clone()));
        let consumers: Vec<Arc<dyn DomainConsumer>> = vec![
            Arc::new(SessionAudit::new(process_id.clone())),
            Arc::new(RevocationTerminator::new(registry.pool().clone())),
            Arc::new(LoginNotifier::new(registry.pool().clone(), process_id.clone())),
        ];

        info!(process_id = %process_id, "Real-time engine initialized");

        Self {
            process_id,
            config: Arc::new(config.clone()),
            registry,
            bus,
            dispatcher,
            consumers: Arc::new(consumers),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Resolve group selectors through `groups`. Call before `start`.
    pub fn with_groups(mut self, groups: Arc<dyn GroupDirectory>) -> Self {
        self.dispatcher = Arc::new(
            DeliveryDispatcher::new(self.registry.clone(), self.bus.clone()).with_groups(groups),
        );
        self
    }

    /// Take the liveness lease and start the background tasks: the routed
    /// subscriber, one domain subscriber per topic, and the heartbeat.
    ///
    /// Fails if the store cannot be reached at all.
    pub async fn start(&self) -> AppResult<()> {
        self.registry.heartbeat().await?;

        let routed = self.bus.subscribe_routed().await?;
        self.tracker.spawn(self.clone().route_loop(routed));

        for topic in DomainTopic::ALL {
            let consumers: Vec<_> = self
                .consumers
                .iter()
                .filter(|c| c.topics().contains(&topic))
                .cloned()
                .collect();
            if consumers.is_empty() {
                continue;
            }
            let events = self.bus.subscribe_domain(topic).await?;
            self.tracker
                .spawn(self.clone().domain_loop(topic, consumers, events));
        }

        self.tracker.spawn(self.clone().heartbeat_loop());

        info!(process_id = %self.process_id, "Real-time engine started");
        Ok(())
    }

    /// Register a new connection and hand back its handle and the receiving
    /// end of its outbound queue.
    pub async fn open_connection(
        &self,
        identity: ConnectionIdentity,
    ) -> AppResult<(Arc<ConnectionHandle>, mpsc::Receiver<OutboundFrame>)> {
        if self.cancel.is_cancelled() {
            return Err(AppError::store_unavailable("Process is shutting down"));
        }
        let (tx, rx) = mpsc::channel(self.config.outbound_queue_capacity.max(1));
        let handle = Arc::new(ConnectionHandle::new(
            identity,
            tx,
            self.cancel.child_token(),
        ));
        self.registry.register(handle.clone()).await?;
        info!(
            conn_id = %handle.id,
            subject_id = %handle.key.subject_id,
            instance = %handle.key.instance,
            guard = %handle.guard,
            "Connection opened"
        );
        Ok((handle, rx))
    }

    /// Run a connection to completion.
    ///
    /// Spawns the writer over `sink` and reads `stream` on the current
    /// task until the client leaves, goes idle, or the connection is closed
    /// by the server. Presence is unregistered before returning.
    pub async fn serve_connection<Si, St>(
        &self,
        handle: Arc<ConnectionHandle>,
        rx: mpsc::Receiver<OutboundFrame>,
        sink: Si,
        mut stream: St,
    ) where
        Si: Sink<OutboundFrame> + Unpin + Send + 'static,
        St: Stream<Item = ClientFrame> + Unpin + Send,
    {
        let writer = self.tracker.spawn(pump_outbound(
            handle.clone(),
            rx,
            sink,
            WriterConfig::from(self.config.as_ref()),
        ));

        let idle = self.config.idle_timeout();
        loop {
            tokio::select! {
                biased;
                _ = handle.closed() => break,
                next = time::timeout(idle, stream.next()) => match next {
                    Ok(Some(ClientFrame::Text(text))) => {
                        handle.touch();
                        self.handle_inbound(&handle, &text).await;
                    }
                    Ok(Some(ClientFrame::Activity)) => handle.touch(),
                    Ok(Some(ClientFrame::Close)) | Ok(None) => {
                        handle.close(CloseReason::ClientClosed);
                        break;
                    }
                    Err(_) => {
                        info!(conn_id = %handle.id, key = %handle.key, "Connection idle, closing");
                        handle.close(CloseReason::IdleTimeout);
                        break;
                    }
                }
            }
        }

        self.close_connection(&handle).await;
        if let Err(e) = writer.await {
            warn!(conn_id = %handle.id, error = %e, "Writer task failed");
        }
    }

    /// Handle a text frame sent by the client.
    pub async fn handle_inbound(&self, handle: &ConnectionHandle, text: &str) {
        let message = match serde_json::from_str::<InboundMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(conn_id = %handle.id, error = %e, "Unrecognized client message");
                handle.enqueue(OutboundFrame::error("unrecognized message"));
                return;
            }
        };

        match message {
            InboundMessage::Ping => {
                handle.enqueue(OutboundFrame::pong());
            }
            InboundMessage::Ack { message_id } => {
                debug!(conn_id = %handle.id, message_id = %message_id, "Client ack");
            }
            InboundMessage::Keyboard { to_subject } => {
                let payload = KeyboardPayload {
                    from_subject: handle.subject_id(),
                    to_subject,
                };
                let result = match Event::from_json(
                    EventKind::Keyboard,
                    &payload,
                    self.process_id.clone(),
                ) {
                    Ok(event) => {
                        self.dispatcher
                            .send(&event, &RecipientSelector::Subject(to_subject))
                            .await
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    warn!(conn_id = %handle.id, to_subject = %to_subject, error = %e, "Keyboard event not delivered");
                }
            }
        }
    }

    /// Unregister a closed connection.
    pub async fn close_connection(&self, handle: &ConnectionHandle) {
        match self.registry.unregister(handle).await {
            Ok(true) => info!(
                conn_id = %handle.id,
                key = %handle.key,
                reason = ?handle.close_reason(),
                "Connection closed"
            ),
            Ok(false) => debug!(conn_id = %handle.id, "Connection already unregistered"),
            Err(e) => warn!(
                conn_id = %handle.id,
                key = %handle.key,
                error = %e,
                "Failed to remove presence record; it lapses with the lease"
            ),
        }
    }

    /// Current counters.
    pub fn stats(&self) -> EngineStats {
        let pool = self.registry.pool();
        EngineStats {
            process_id: self.process_id.clone(),
            connections: pool.connection_count(),
            subjects: pool.subject_count(),
        }
    }

    /// Graceful shutdown: close and unregister every connection, let the
    /// writers drain for the grace period, stop the background tasks, and
    /// release the lease.
    pub async fn shutdown(&self) {
        info!(process_id = %self.process_id, "Shutting down real-time engine");

        let connections = self.registry.pool().all_connections();
        for handle in &connections {
            handle.close(CloseReason::Shutdown);
        }
        for handle in &connections {
            self.close_connection(handle).await;
        }

        self.cancel.cancel();
        self.tracker.close();
        let grace = self.config.drain_grace() + Duration::from_secs(1);
        if time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                tasks = self.tracker.len(),
                "Real-time tasks still running after drain grace"
            );
        }

        if let Err(e) = self.registry.release().await {
            warn!(error = %e, "Failed to release liveness lease");
        }
        info!(
            process_id = %self.process_id,
            closed = connections.len(),
            "Real-time engine shut down"
        );
    }

    async fn route_loop(self, mut deliveries: BoxStream<'static, RoutedDelivery>) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                next = deliveries.next() => match next {
                    Some(delivery) => {
                        self.dispatcher.deliver_routed(delivery).await;
                    }
                    None => {
                        warn!(process_id = %self.process_id, "Routed subscription ended, resubscribing");
                        let Some(stream) = self
                            .resubscribe("routed", || self.bus.subscribe_routed())
                            .await
                        else {
                            return;
                        };
                        deliveries = stream;
                    }
                }
            }
        }
    }

    async fn domain_loop(
        self,
        topic: DomainTopic,
        consumers: Vec<Arc<dyn DomainConsumer>>,
        mut events: BoxStream<'static, DomainEvent>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                next = events.next() => match next {
                    Some(event) => {
                        for consumer in &consumers {
                            debug!(consumer = consumer.name(), event_id = %event.id, "Domain event");
                            consumer.handle(&event).await;
                        }
                    }
                    None => {
                        warn!(topic = %topic, "Domain subscription ended, resubscribing");
                        let Some(stream) = self
                            .resubscribe(topic.as_str(), || self.bus.subscribe_domain(topic))
                            .await
                        else {
                            return;
                        };
                        events = stream;
                    }
                }
            }
        }
    }

    async fn heartbeat_loop(self) {
        let period = self.config.heartbeat_interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = self.registry.heartbeat().await {
                        warn!(process_id = %self.process_id, error = %e, "Heartbeat failed");
                    }
                }
            }
        }
    }

    async fn resubscribe<T, F, Fut>(
        &self,
        what: &str,
        mut subscribe: F,
    ) -> Option<BoxStream<'static, T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<BoxStream<'static, T>>>,
    {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = time::sleep(RESUBSCRIBE_DELAY) => {}
            }
            match subscribe().await {
                Ok(stream) => {
                    info!(subscription = what, "Resubscribed");
                    return Some(stream);
                }
                Err(e) => warn!(subscription = what, error = %e, "Resubscribe failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc as fmpsc;
    use lumen_cache::memory::{MemoryPubSub, MemoryStore};
    use lumen_core::events::{RevocationReason, SessionEvent};
    use lumen_core::traits::DomainEventPublisher;
    use lumen_core::types::{ClientInstanceId, Guard};
    use serde_json::value::RawValue;
    use uuid::Uuid;

    use super::*;

    fn stores() -> StoreManager {
        StoreManager::from_providers(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryPubSub::default()),
        )
    }

    fn engine(name: &str, stores: &StoreManager) -> RealtimeEngine {
        RealtimeEngine::new(
            ProcessId::new(name).unwrap(),
            &RealtimeConfig::default(),
            stores,
        )
    }

    fn identity(subject: i64, instance: &str) -> ConnectionIdentity {
        ConnectionIdentity {
            subject_id: SubjectId(subject),
            instance: ClientInstanceId::new(instance).unwrap(),
            credential_id: Uuid::new_v4(),
            guard: Guard::Api,
        }
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_pong() {
        let stores = stores();
        let engine = engine("p1", &stores);
        engine.start().await.unwrap();

        let (handle, rx) = engine.open_connection(identity(1, "dev1")).await.unwrap();
        let (sink, mut socket) = fmpsc::unbounded();
        let (client, stream) = fmpsc::unbounded();
        let serving = {
            let engine = engine.clone();
            let handle = handle.clone();
            tokio::spawn(async move { engine.serve_connection(handle, rx, sink, stream).await })
        };

        client
            .unbounded_send(ClientFrame::Text(r#"{"event":"ping"}"#.to_string()))
            .unwrap();
        assert_eq!(socket.next().await, Some(OutboundFrame::pong()));

        client.unbounded_send(ClientFrame::Close).unwrap();
        serving.await.unwrap();
        assert_eq!(handle.close_reason(), Some(CloseReason::ClientClosed));
        assert_eq!(engine.stats().connections, 0);
        assert!(engine.registry.lookup(SubjectId(1)).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connection_is_closed() {
        let stores = stores();
        let engine = engine("p1", &stores);
        let (handle, rx) = engine.open_connection(identity(1, "dev1")).await.unwrap();
        let (sink, _socket) = fmpsc::unbounded();
        let (_client, stream) = fmpsc::unbounded::<ClientFrame>();

        engine
            .serve_connection(handle.clone(), rx, sink, stream)
            .await;
        assert_eq!(handle.close_reason(), Some(CloseReason::IdleTimeout));
        assert_eq!(engine.stats().connections, 0);
    }

    #[tokio::test]
    async fn test_routed_delivery_between_engines() {
        let stores = stores();
        let p1 = engine("p1", &stores);
        let p2 = engine("p2", &stores);
        p1.start().await.unwrap();
        p2.start().await.unwrap();

        let (_handle, mut rx) = p1.open_connection(identity(42, "dev1")).await.unwrap();

        let event = Event::new(
            EventKind::TalkMessage,
            RawValue::from_string(r#"{"text":"hello",  "n":[1, 2]}"#.to_string()).unwrap(),
            p2.process_id.clone(),
        );
        let report = p2
            .dispatcher
            .send(&event, &RecipientSelector::Subject(SubjectId(42)))
            .await
            .unwrap();
        assert_eq!(report.routed_remote, 1);

        let frame = time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame, OutboundFrame::Text(Arc::from(event.to_frame().unwrap())));
    }

    #[tokio::test]
    async fn test_revocation_closes_sockets_on_every_engine() {
        let stores = stores();
        let p1 = engine("p1", &stores);
        let p2 = engine("p2", &stores);
        p1.start().await.unwrap();
        p2.start().await.unwrap();

        let (handle, _rx) = p1.open_connection(identity(7, "dev1")).await.unwrap();
        p2.bus
            .publish_domain(&DomainEvent::new(SessionEvent::CredentialRevoked {
                subject_id: SubjectId(7),
                credential_id: handle.credential_id,
                guard: Guard::Api,
                reason: RevocationReason::Logout,
            }))
            .await
            .unwrap();

        time::timeout(Duration::from_secs(1), handle.closed())
            .await
            .unwrap();
        assert_eq!(handle.close_reason(), Some(CloseReason::Revoked));
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_releases_lease() {
        let stores = stores();
        let p1 = engine("p1", &stores);
        let p2 = engine("p2", &stores);
        p1.start().await.unwrap();
        p2.start().await.unwrap();

        let (handle, rx) = p1.open_connection(identity(1, "dev1")).await.unwrap();
        let (sink, socket) = fmpsc::unbounded();
        let (_client, stream) = fmpsc::unbounded::<ClientFrame>();
        let serving = {
            let engine = p1.clone();
            let handle = handle.clone();
            tokio::spawn(async move { engine.serve_connection(handle, rx, sink, stream).await })
        };
        for text in ["A", "B"] {
            handle.enqueue(OutboundFrame::Text(Arc::from(text)));
        }

        p1.shutdown().await;
        serving.await.unwrap();

        let frames: Vec<_> = socket.collect().await;
        assert_eq!(
            frames.last(),
            Some(&OutboundFrame::Close("shutdown".to_string()))
        );
        assert!(frames.contains(&OutboundFrame::Text(Arc::from("A"))));
        assert!(p2.registry.lookup(SubjectId(1)).await.unwrap().is_empty());
        assert!(p1.open_connection(identity(2, "dev1")).await.is_err());
    }
}
