//! Delivery dispatcher: selector → presence lookup → local write or routed
//! publish.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::value::RawValue;
use tracing::{debug, warn};

use lumen_core::error::AppError;
use lumen_core::result::AppResult;
use lumen_core::types::{ClientInstanceId, ProcessId, SubjectId};

use super::group::GroupDirectory;
use crate::bridge::{EventBus, RoutedDelivery};
use crate::connection::{ConnectionKey, EnqueueOutcome};
use crate::message::{Event, OutboundFrame, RecipientSelector};
use crate::presence::PresenceRegistry;

/// What happened to one send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Frames queued on sockets owned by this process.
    pub delivered_local: usize,
    /// Sockets on other processes the event was routed to.
    pub routed_remote: usize,
    /// Subjects with no live connection.
    pub offline_subjects: usize,
    /// Connections closed because their queue was full.
    pub slow_consumers: usize,
    /// Routed publishes that failed or reached nobody.
    pub failed_publishes: usize,
    /// Subjects whose presence lookup failed.
    pub failed_lookups: usize,
}

/// Routes events to every live connection of their recipients.
#[derive(Debug)]
pub struct DeliveryDispatcher {
    registry: Arc<PresenceRegistry>,
    bus: EventBus,
    groups: Option<Arc<dyn GroupDirectory>>,
}

impl DeliveryDispatcher {
    /// Create a dispatcher without group support.
    pub fn new(registry: Arc<PresenceRegistry>, bus: EventBus) -> Self {
        Self {
            registry,
            bus,
            groups: None,
        }
    }

    /// Resolve group selectors through `groups`.
    pub fn with_groups(mut self, groups: Arc<dyn GroupDirectory>) -> Self {
        self.groups = Some(groups);
        self
    }

    fn process_id(&self) -> &ProcessId {
        self.registry.process_id()
    }

    /// Deliver an event to everyone matched by `selector`.
    ///
    /// Offline recipients are counted, never an error. Lookup and publish
    /// failures are logged and counted; the send only fails when the
    /// selector cannot be resolved or every lookup failed.
    pub async fn send(
        &self,
        event: &Event,
        selector: &RecipientSelector,
    ) -> AppResult<DeliveryReport> {
        let (subjects, instance) = self.resolve(selector).await?;
        let frame: Arc<str> = Arc::from(event.to_frame()?);

        let mut report = DeliveryReport::default();
        let mut remote: BTreeMap<ProcessId, Vec<ConnectionKey>> = BTreeMap::new();
        let mut last_error: Option<AppError> = None;

        for subject_id in &subjects {
            let records = match self.registry.lookup(*subject_id).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(subject_id = %subject_id, error = %e, "Presence lookup failed");
                    report.failed_lookups += 1;
                    last_error = Some(e);
                    continue;
                }
            };

            let mut online = false;
            for record in records {
                if instance.as_ref().is_some_and(|i| *i != record.instance) {
                    continue;
                }
                online = true;
                let key = ConnectionKey {
                    subject_id: record.subject_id,
                    instance: record.instance,
                };
                if record.process_id == *self.process_id() {
                    self.write_local(&key, &frame, &mut report).await;
                } else {
                    remote.entry(record.process_id).or_default().push(key);
                }
            }
            if !online {
                debug!(subject_id = %subject_id, event_id = %event.id, "Recipient offline");
                report.offline_subjects += 1;
            }
        }

        if !subjects.is_empty() && report.failed_lookups == subjects.len() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        for (destination, targets) in remote {
            let count = targets.len();
            let delivery = RoutedDelivery {
                id: event.id,
                origin: self.process_id().clone(),
                targets,
                event: RawValue::from_string(frame.to_string())?,
            };
            match self.bus.publish_routed(&destination, &delivery).await {
                Ok(0) => {
                    warn!(
                        destination = %destination,
                        event_id = %event.id,
                        "Routed delivery reached no subscriber"
                    );
                    report.failed_publishes += 1;
                }
                Ok(_) => report.routed_remote += count,
                Err(e) => {
                    warn!(
                        destination = %destination,
                        event_id = %event.id,
                        error = %e,
                        "Routed publish failed"
                    );
                    report.failed_publishes += 1;
                }
            }
        }

        debug!(event_id = %event.id, kind = ?event.kind, report = ?report, "Event dispatched");
        Ok(report)
    }

    /// Write a delivery routed here by another process.
    ///
    /// The event bytes are written exactly as received. Targets with no
    /// local connection have their stale presence record removed.
    pub async fn deliver_routed(&self, delivery: RoutedDelivery) -> DeliveryReport {
        let frame: Arc<str> = Arc::from(delivery.event.get());
        let mut report = DeliveryReport::default();
        for key in &delivery.targets {
            self.write_local(key, &frame, &mut report).await;
        }
        debug!(
            event_id = %delivery.id,
            origin = %delivery.origin,
            delivered = report.delivered_local,
            "Routed delivery written"
        );
        report
    }

    async fn write_local(&self, key: &ConnectionKey, frame: &Arc<str>, report: &mut DeliveryReport) {
        let Some(handle) = self.registry.pool().get_by_key(key) else {
            report.offline_subjects += 1;
            self.registry.remove_record(key).await;
            return;
        };
        match handle.enqueue(OutboundFrame::Text(frame.clone())) {
            EnqueueOutcome::Queued => report.delivered_local += 1,
            EnqueueOutcome::SlowConsumer => report.slow_consumers += 1,
            EnqueueOutcome::Closed => {
                debug!(conn_id = %handle.id, key = %key, "Dropping frame for closing connection");
            }
        }
    }

    async fn resolve(
        &self,
        selector: &RecipientSelector,
    ) -> AppResult<(Vec<SubjectId>, Option<ClientInstanceId>)> {
        let (subjects, instance) = match selector {
            RecipientSelector::Subject(subject_id) => (vec![*subject_id], None),
            RecipientSelector::Subjects(subject_ids) => (subject_ids.clone(), None),
            RecipientSelector::Instance(subject_id, instance) => {
                (vec![*subject_id], Some(instance.clone()))
            }
            RecipientSelector::Group(group_id) => {
                let Some(groups) = &self.groups else {
                    return Err(AppError::validation(
                        "Group delivery requires a group directory",
                    ));
                };
                (groups.members(*group_id).await?, None)
            }
        };

        let mut seen = HashSet::with_capacity(subjects.len());
        let subjects = subjects.into_iter().filter(|s| seen.insert(*s)).collect();
        Ok((subjects, instance))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use lumen_cache::memory::{MemoryPubSub, MemoryStore};
    use lumen_cache::testing::ChaosStore;
    use lumen_core::ErrorKind;
    use lumen_core::config::RealtimeConfig;
    use lumen_core::traits::{CacheProvider, PubSubProvider};

    use super::*;
    use crate::connection::CloseReason;
    use crate::connection::handle::tests::handle;
    use crate::dispatch::StaticGroups;
    use crate::message::EventKind;

    struct Node {
        registry: Arc<PresenceRegistry>,
        bus: EventBus,
        dispatcher: DeliveryDispatcher,
    }

    async fn node(
        name: &str,
        store: Arc<dyn CacheProvider>,
        pubsub: Arc<dyn PubSubProvider>,
    ) -> Node {
        let process_id = ProcessId::new(name).unwrap();
        let registry = Arc::new(PresenceRegistry::new(
            process_id.clone(),
            store,
            &RealtimeConfig::default(),
        ));
        registry.heartbeat().await.unwrap();
        let bus = EventBus::new(pubsub, process_id);
        let dispatcher = DeliveryDispatcher::new(registry.clone(), bus.clone());
        Node {
            registry,
            bus,
            dispatcher,
        }
    }

    fn event(origin: &str, payload: &str) -> Event {
        Event::new(
            EventKind::TalkMessage,
            RawValue::from_string(payload.to_string()).unwrap(),
            ProcessId::new(origin).unwrap(),
        )
    }

    fn text(frame: OutboundFrame) -> String {
        match frame {
            OutboundFrame::Text(text) => text.to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_local_delivery_reaches_every_instance() {
        let p1 = node("p1", Arc::new(MemoryStore::new()), Arc::new(MemoryPubSub::default())).await;
        let (a, mut ra) = handle(42, "dev1", 8);
        let (b, mut rb) = handle(42, "dev2", 8);
        p1.registry.register(a).await.unwrap();
        p1.registry.register(b).await.unwrap();

        let ev = event("p1", r#"{"text":"hi"}"#);
        let report = p1
            .dispatcher
            .send(&ev, &RecipientSelector::Subject(SubjectId(42)))
            .await
            .unwrap();
        assert_eq!(report.delivered_local, 2);
        assert_eq!(report.routed_remote, 0);

        let expected = ev.to_frame().unwrap();
        assert_eq!(text(ra.recv().await.unwrap()), expected);
        assert_eq!(text(rb.recv().await.unwrap()), expected);
    }

    #[tokio::test]
    async fn test_instance_selector_targets_one_connection() {
        let p1 = node("p1", Arc::new(MemoryStore::new()), Arc::new(MemoryPubSub::default())).await;
        let (a, mut ra) = handle(42, "dev1", 8);
        let (b, mut rb) = handle(42, "dev2", 8);
        p1.registry.register(a).await.unwrap();
        p1.registry.register(b).await.unwrap();

        let selector =
            RecipientSelector::Instance(SubjectId(42), ClientInstanceId::new("dev2").unwrap());
        let report = p1.dispatcher.send(&event("p1", "1"), &selector).await.unwrap();
        assert_eq!(report.delivered_local, 1);
        assert!(rb.try_recv().is_ok());
        assert!(ra.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remote_delivery_is_routed_to_owner() {
        let store: Arc<dyn CacheProvider> = Arc::new(MemoryStore::new());
        let pubsub: Arc<dyn PubSubProvider> = Arc::new(MemoryPubSub::default());
        let p1 = node("p1", store.clone(), pubsub.clone()).await;
        let p2 = node("p2", store.clone(), pubsub.clone()).await;

        let mut p1_inbox = p1.bus.subscribe_routed().await.unwrap();
        let (conn, mut rx) = handle(42, "dev1", 8);
        p1.registry.register(conn).await.unwrap();

        let ev = event("p2", r#"{"b":2,  "a":1}"#);
        let report = p2
            .dispatcher
            .send(&ev, &RecipientSelector::Subject(SubjectId(42)))
            .await
            .unwrap();
        assert_eq!(report.routed_remote, 1);
        assert_eq!(report.delivered_local, 0);

        let delivery = p1_inbox.next().await.unwrap();
        let written = p1.dispatcher.deliver_routed(delivery).await;
        assert_eq!(written.delivered_local, 1);
        assert_eq!(text(rx.recv().await.unwrap()), ev.to_frame().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_local_and_routed_sends_arrive_in_order_under_latency() {
        let chaos = ChaosStore::default();
        let store: Arc<dyn CacheProvider> = Arc::new(chaos.clone());
        let pubsub: Arc<dyn PubSubProvider> = Arc::new(MemoryPubSub::default());
        let p1 = node("p1", store.clone(), pubsub.clone()).await;
        let p2 = node("p2", store, pubsub).await;

        let mut p1_inbox = p1.bus.subscribe_routed().await.unwrap();
        let (conn, mut rx) = handle(42, "dev1", 16);
        p1.registry.register(conn).await.unwrap();
        chaos.set_latency(Duration::from_millis(40));

        let selector = RecipientSelector::Subject(SubjectId(42));
        for seq in 0..10 {
            let payload = format!(r#"{{"seq":{seq}}}"#);
            if seq % 2 == 0 {
                let report = p1.dispatcher.send(&event("p1", &payload), &selector).await.unwrap();
                assert_eq!(report.delivered_local, 1);
            } else {
                let report = p2.dispatcher.send(&event("p2", &payload), &selector).await.unwrap();
                assert_eq!(report.routed_remote, 1);
                let delivery = p1_inbox.next().await.unwrap();
                p1.dispatcher.deliver_routed(delivery).await;
            }
        }

        for seq in 0..10 {
            let frame: serde_json::Value = serde_json::from_str(&text(rx.recv().await.unwrap())).unwrap();
            assert_eq!(frame["payload"]["seq"], seq);
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_offline_subject_is_not_an_error() {
        let store = MemoryStore::new();
        let p1 = node("p1", Arc::new(store.clone()), Arc::new(MemoryPubSub::default())).await;

        let report = p1
            .dispatcher
            .send(&event("p1", "{}"), &RecipientSelector::Subject(SubjectId(404)))
            .await
            .unwrap();
        assert_eq!(report.offline_subjects, 1);
        assert!(
            store
                .hash_get_all(&lumen_cache::keys::presence(SubjectId(404)))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_routed_delivery_without_connection_removes_stale_record() {
        let store = MemoryStore::new();
        let p1 = node("p1", Arc::new(store.clone()), Arc::new(MemoryPubSub::default())).await;
        p1.registry
            .directory()
            .upsert(SubjectId(5), p1.registry.process_id(), &ClientInstanceId::new("gone").unwrap())
            .await
            .unwrap();

        let delivery = RoutedDelivery {
            id: uuid::Uuid::new_v4(),
            origin: ProcessId::new("p2").unwrap(),
            targets: vec![ConnectionKey {
                subject_id: SubjectId(5),
                instance: ClientInstanceId::new("gone").unwrap(),
            }],
            event: RawValue::from_string("{}".to_string()).unwrap(),
        };
        let report = p1.dispatcher.deliver_routed(delivery).await;
        assert_eq!(report.delivered_local, 0);
        assert!(p1.registry.lookup(SubjectId(5)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_consumer_is_counted_and_closed() {
        let p1 = node("p1", Arc::new(MemoryStore::new()), Arc::new(MemoryPubSub::default())).await;
        let (conn, _rx) = handle(1, "dev1", 1);
        p1.registry.register(conn.clone()).await.unwrap();

        let selector = RecipientSelector::Subject(SubjectId(1));
        let first = p1.dispatcher.send(&event("p1", "1"), &selector).await.unwrap();
        let second = p1.dispatcher.send(&event("p1", "2"), &selector).await.unwrap();
        assert_eq!(first.delivered_local, 1);
        assert_eq!(second.slow_consumers, 1);
        assert_eq!(conn.close_reason(), Some(CloseReason::SlowConsumer));
    }

    #[tokio::test]
    async fn test_group_selector() {
        let p1 = node("p1", Arc::new(MemoryStore::new()), Arc::new(MemoryPubSub::default())).await;
        let selector = RecipientSelector::Group(7);

        let err = p1.dispatcher.send(&event("p1", "{}"), &selector).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let groups = StaticGroups::new().with_group(7, [SubjectId(1), SubjectId(2), SubjectId(1)]);
        let dispatcher =
            DeliveryDispatcher::new(p1.registry.clone(), p1.bus.clone()).with_groups(Arc::new(groups));
        let (conn, mut rx) = handle(1, "dev1", 8);
        p1.registry.register(conn).await.unwrap();

        let report = dispatcher.send(&event("p1", "{}"), &selector).await.unwrap();
        assert_eq!(report.delivered_local, 1);
        assert_eq!(report.offline_subjects, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_fails_only_when_every_lookup_fails() {
        let chaos = ChaosStore::default();
        let p1 = node("p1", Arc::new(chaos.clone()), Arc::new(MemoryPubSub::default())).await;
        chaos.set_failing(true);

        let err = p1
            .dispatcher
            .send(&event("p1", "{}"), &RecipientSelector::Subjects(vec![SubjectId(1), SubjectId(2)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::StoreUnavailable);
    }
}
