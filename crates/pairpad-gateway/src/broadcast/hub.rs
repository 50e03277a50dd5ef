use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use pairpad_core::error::{PairpadError, Result};

/// One published event, serialized once and shared by every receiver.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub topic: Arc<str>,
    pub event: Arc<str>,
    pub payload: Arc<Value>,
}

impl Broadcast {
    /// Decode the payload into its typed event.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(self.payload.as_ref()).map_err(|e| {
            PairpadError::BadRequest(format!("{}/{} invalid payload: {e}", self.topic, self.event))
        })
    }
}

struct Subscriber {
    events: Vec<String>,
    tx: mpsc::Sender<Broadcast>,
}

impl Subscriber {
    fn wants(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }
}

#[derive(Default)]
struct HubInner {
    topics: DashMap<String, DashMap<u64, Subscriber>>,
    seq: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl HubInner {
    fn unsubscribe(&self, topic: &str, id: u64) {
        if let Some(subs) = self.topics.get(topic) {
            subs.remove(&id);
        }
        self.topics.remove_if(topic, |_, subs| subs.is_empty());
    }
}

/// In-process broadcaster: `topic -> {subscription id -> queue}`.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
    queue: usize,
}

impl Hub {
    /// `queue` bounds each subscription's backlog.
    pub fn new(queue: usize) -> Self {
        Self {
            inner: Arc::new(HubInner::default()),
            queue: queue.max(1),
        }
    }

    pub fn channel(&self, topic: impl Into<String>) -> Channel {
        Channel {
            hub: self.clone(),
            topic: topic.into(),
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }

    /// (queued deliveries, dropped deliveries) since start.
    pub fn delivery_stats(&self) -> (u64, u64) {
        (
            self.inner.published.load(Ordering::Relaxed),
            self.inner.dropped.load(Ordering::Relaxed),
        )
    }

    fn publish_value(&self, topic: &str, event: &str, payload: Value) -> usize {
        let Some(subs) = self.inner.topics.get(topic) else {
            return 0;
        };

        let msg = Broadcast {
            topic: Arc::from(topic),
            event: Arc::from(event),
            payload: Arc::new(payload),
        };

        let mut delivered = 0;
        for sub in subs.iter() {
            if !sub.wants(event) {
                continue;
            }
            match sub.tx.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                }
                // receiver is mid-drop; its Drop unsubscribes
                Err(TrySendError::Closed(_)) => {}
            }
        }
        self.inner.published.fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    fn subscribe(&self, topic: String, events: Vec<String>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue);
        let id = self.inner.seq.fetch_add(1, Ordering::Relaxed);

        self.inner
            .topics
            .entry(topic.clone())
            .or_default()
            .insert(id, Subscriber { events, tx });

        Subscription {
            hub: Arc::downgrade(&self.inner),
            topic,
            id,
            rx,
        }
    }
}

/// Handle to one topic.
#[derive(Clone)]
pub struct Channel {
    hub: Hub,
    topic: String,
}

impl Channel {
    /// Publish to every current subscriber of `event`. Returns how many queues accepted it.
    pub fn publish<T: Serialize>(&self, event: &str, payload: &T) -> Result<usize> {
        let value = serde_json::to_value(payload)
            .map_err(|e| PairpadError::Internal(format!("json encode failed: {e}")))?;
        Ok(self.hub.publish_value(&self.topic, event, value))
    }

    /// Start building a subscription for `event`.
    pub fn on(&self, event: &str) -> SubscriptionBuilder {
        SubscriptionBuilder {
            hub: self.hub.clone(),
            topic: self.topic.clone(),
            events: vec![event.to_string()],
        }
    }
}

pub struct SubscriptionBuilder {
    hub: Hub,
    topic: String,
    events: Vec<String>,
}

impl SubscriptionBuilder {
    pub fn on(mut self, event: &str) -> Self {
        self.events.push(event.to_string());
        self
    }

    pub fn subscribe(self) -> Subscription {
        self.hub.subscribe(self.topic, self.events)
    }
}

/// Live subscription. Dropping it unsubscribes.
pub struct Subscription {
    hub: Weak<HubInner>,
    topic: String,
    id: u64,
    rx: mpsc::Receiver<Broadcast>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Broadcast> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Broadcast> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.topic, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_reaches_matching_events_only() {
        let hub = Hub::new(8);
        let ch = hub.channel("room:AB12:content");
        let mut content = ch.on("content").subscribe();
        let mut other = ch.on("noise").subscribe();

        let n = ch.publish("content", &json!({ "content": "x" })).unwrap();
        assert_eq!(n, 1);

        let got = content.recv().await.unwrap();
        assert_eq!(&*got.event, "content");
        assert_eq!(got.payload["content"], "x");
        assert!(other.try_recv().is_none());
    }

    #[test]
    fn drop_unsubscribes_and_prunes_topic() {
        let hub = Hub::new(8);
        let sub = hub.channel("t").on("e").subscribe();
        assert_eq!(hub.subscriber_count("t"), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count("t"), 0);
        assert_eq!(hub.channel("t").publish("e", &1).unwrap(), 0);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let hub = Hub::new(1);
        let ch = hub.channel("t");
        let mut sub = ch.on("e").subscribe();

        assert_eq!(ch.publish("e", &1).unwrap(), 1);
        assert_eq!(ch.publish("e", &2).unwrap(), 0);
        assert_eq!(hub.delivery_stats(), (1, 1));

        let first = sub.try_recv().unwrap();
        assert_eq!(*first.payload, json!(1));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn topics_are_isolated() {
        let hub = Hub::new(4);
        let mut a = hub.channel("room:A:content").on("content").subscribe();
        hub.channel("room:B:content").publish("content", &"b").unwrap();
        assert!(a.try_recv().is_none());
    }
}
