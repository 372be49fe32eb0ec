// workflow-events/src/registry.rs
// ============================================================================
// Module: Event Fan-Out Registry
// Description: channel -> subscriber-set registry with best-effort broadcast.
// Purpose: Decouple the interpreter's event emission from any one transport
// (SSE, WebSocket-style framed channel).
// Dependencies: async-trait, serde_json, std::sync::RwLock, workflow-core
// ============================================================================

//! ## Overview
//! A mutex-guarded subscriber-set registry where broadcast iterates under a
//! lock that allows concurrent broadcasts across channels. A closed
//! subscriber is pruned from every channel it belonged to, never delivered
//! to again.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use workflow_core::events::TimestampedEvent;
use workflow_core::events::WorkflowEvent;
use workflow_core::interfaces::EventPublisher;
use workflow_core::interfaces::PublishError;

/// An opaque send-string capability with a liveness query, registered as a
/// `Subscriber` record. Concrete transports (SSE, WebSocket-style) implement
/// this over their own outbound channel.
pub trait Subscriber: Send + Sync {
    /// Stable identifier for this subscriber within the registry.
    fn id(&self) -> &str;

    /// Hands a single framed string to the transport. Implementations must
    /// not block; a full or closed outbound channel should simply drop the
    /// frame (the registry already treats delivery as best-effort).
    fn send(&self, frame: &str);

    /// Whether this subscriber can still receive frames.
    fn is_open(&self) -> bool;
}

/// Caller-supplied metadata recorded alongside a subscriber.
#[derive(Debug, Clone, Default)]
pub struct SubscriberMeta {
    /// Authenticated user, when known.
    pub user_id: Option<String>,
    /// Owning organization, when known.
    pub org_id: Option<String>,
    /// Channels this subscriber currently belongs to.
    pub channels: BTreeSet<String>,
}

struct Entry {
    subscriber: Arc<dyn Subscriber>,
    meta: SubscriberMeta,
}

/// The channel -> subscriber-set fan-out registry.
#[derive(Default)]
pub struct EventRegistry {
    /// channel name -> subscriber ids.
    channels: RwLock<BTreeMap<String, BTreeSet<String>>>,
    /// subscriber id -> (handle, metadata).
    subscribers: RwLock<BTreeMap<String, Entry>>,
}

impl EventRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber with initial metadata (and, via
    /// `meta.channels`, an initial channel set).
    pub fn register(&self, subscriber: Arc<dyn Subscriber>, meta: SubscriberMeta) {
        let id = subscriber.id().to_string();
        let channels = meta.channels.clone();
        #[allow(clippy::expect_used, reason = "poisoned lock means the process is already unwinding")]
        {
            self.subscribers.write().expect("registry lock poisoned").insert(id.clone(), Entry { subscriber, meta });
            let mut channel_map = self.channels.write().expect("registry lock poisoned");
            for channel in channels {
                channel_map.entry(channel).or_default().insert(id.clone());
            }
        }
    }

    /// Removes a subscriber from every channel and the registry itself.
    pub fn unregister(&self, subscriber_id: &str) {
        #[allow(clippy::expect_used, reason = "poisoned lock means the process is already unwinding")]
        {
            self.subscribers.write().expect("registry lock poisoned").remove(subscriber_id);
            let mut channel_map = self.channels.write().expect("registry lock poisoned");
            for subscribers in channel_map.values_mut() {
                subscribers.remove(subscriber_id);
            }
            channel_map.retain(|_, subscribers| !subscribers.is_empty());
        }
    }

    /// Adds `subscriber_id` to `channel`.
    pub fn subscribe(&self, subscriber_id: &str, channel: &str) {
        #[allow(clippy::expect_used, reason = "poisoned lock means the process is already unwinding")]
        {
            let mut subscribers = self.subscribers.write().expect("registry lock poisoned");
            let Some(entry) = subscribers.get_mut(subscriber_id) else { return };
            entry.meta.channels.insert(channel.to_string());
            self.channels
                .write()
                .expect("registry lock poisoned")
                .entry(channel.to_string())
                .or_default()
                .insert(subscriber_id.to_string());
        }
    }

    /// Removes `subscriber_id` from `channel` only.
    pub fn unsubscribe(&self, subscriber_id: &str, channel: &str) {
        #[allow(clippy::expect_used, reason = "poisoned lock means the process is already unwinding")]
        {
            if let Some(entry) = self.subscribers.write().expect("registry lock poisoned").get_mut(subscriber_id) {
                entry.meta.channels.remove(channel);
            }
            let mut channel_map = self.channels.write().expect("registry lock poisoned");
            if let Some(subscribers) = channel_map.get_mut(channel) {
                subscribers.remove(subscriber_id);
                if subscribers.is_empty() {
                    channel_map.remove(channel);
                }
            }
        }
    }

    /// Broadcasts `event` to every open subscriber of `channel`. Serializes
    /// the event once; delivery to each subscriber is best-effort and
    /// never blocks on another subscriber.
    pub fn broadcast(&self, channel: &str, event: &WorkflowEvent) -> Result<(), PublishError> {
        let frame = serde_json::to_string(&TimestampedEvent::now(event.clone()))
            .map_err(|err| PublishError::Serialize(err.to_string()))?;
        let mut stale = Vec::new();
        #[allow(clippy::expect_used, reason = "poisoned lock means the process is already unwinding")]
        {
            let channel_map = self.channels.read().expect("registry lock poisoned");
            let Some(subscriber_ids) = channel_map.get(channel) else { return Ok(()) };
            let subscribers = self.subscribers.read().expect("registry lock poisoned");
            for subscriber_id in subscriber_ids {
                let Some(entry) = subscribers.get(subscriber_id) else { continue };
                if entry.subscriber.is_open() {
                    entry.subscriber.send(&frame);
                } else {
                    stale.push(subscriber_id.clone());
                }
            }
        }
        for subscriber_id in stale {
            self.unregister(&subscriber_id);
        }
        Ok(())
    }

    /// Broadcasts to every channel in `channels`.
    pub fn broadcast_to_many(&self, channels: &[String], event: &WorkflowEvent) -> Result<(), PublishError> {
        for channel in channels {
            self.broadcast(channel, event)?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for EventRegistry {
    async fn publish(&self, channel: &str, event: &WorkflowEvent) -> Result<(), PublishError> {
        self.broadcast(channel, event)
    }

    async fn publish_many(&self, channels: &[String], event: &WorkflowEvent) -> Result<(), PublishError> {
        self.broadcast_to_many(channels, event)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;

    use workflow_core::ids::RunId;
    use workflow_core::ids::WorkflowId;
    use workflow_core::model::TriggerType;

    use super::*;

    struct TestSubscriber {
        id: String,
        open: AtomicBool,
        received: std::sync::Mutex<Vec<String>>,
    }

    impl TestSubscriber {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                open: AtomicBool::new(true),
                received: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    impl Subscriber for TestSubscriber {
        fn id(&self) -> &str {
            &self.id
        }

        fn send(&self, frame: &str) {
            self.received.lock().unwrap().push(frame.to_string());
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    fn sample_event() -> WorkflowEvent {
        WorkflowEvent::RunStarted {
            run_id: RunId::new("r1"),
            workflow_id: WorkflowId::new("w1"),
            trigger_type: TriggerType::Api,
        }
    }

    #[test]
    fn broadcast_reaches_every_subscriber_on_channel() {
        let registry = EventRegistry::new();
        let a = TestSubscriber::new("a");
        let b = TestSubscriber::new("b");
        registry.register(
            a.clone(),
            SubscriberMeta { channels: BTreeSet::from(["run:1".to_string()]), ..Default::default() },
        );
        registry.register(
            b.clone(),
            SubscriberMeta { channels: BTreeSet::from(["run:1".to_string()]), ..Default::default() },
        );
        registry.broadcast("run:1", &sample_event()).unwrap();
        assert_eq!(a.received.lock().unwrap().len(), 1);
        assert_eq!(b.received.lock().unwrap().len(), 1);
    }

    #[test]
    fn closed_subscriber_is_pruned_on_next_broadcast() {
        let registry = EventRegistry::new();
        let a = TestSubscriber::new("a");
        registry.register(
            a.clone(),
            SubscriberMeta { channels: BTreeSet::from(["run:1".to_string()]), ..Default::default() },
        );
        a.open.store(false, Ordering::SeqCst);
        registry.broadcast("run:1", &sample_event()).unwrap();
        assert!(a.received.lock().unwrap().is_empty());
        registry.subscribe("a", "run:1");
        registry.broadcast("run:1", &sample_event()).unwrap();
        assert!(a.received.lock().unwrap().is_empty(), "pruned subscriber must not re-receive");
    }

    #[test]
    fn unsubscribe_removes_only_that_channel() {
        let registry = EventRegistry::new();
        let a = TestSubscriber::new("a");
        registry.register(
            a.clone(),
            SubscriberMeta {
                channels: BTreeSet::from(["run:1".to_string(), "org:1".to_string()]),
                ..Default::default()
            },
        );
        registry.unsubscribe("a", "run:1");
        registry.broadcast("run:1", &sample_event()).unwrap();
        registry.broadcast("org:1", &sample_event()).unwrap();
        assert_eq!(a.received.lock().unwrap().len(), 1);
    }
}
