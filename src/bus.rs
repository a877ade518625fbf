//! Invalidation bus: cross-consumer refetch notifications.
//!
//! Write consumers publish a topic (their resource template) after a
//! successful mutation; read consumers subscribed to the same topic refetch.
//! The two sides never reference each other, only the bus.
//!
//! # Dispatch semantics
//!
//! [`InvalidationBus::publish`] calls handlers synchronously, in the order
//! they subscribed. The subscriber list is snapshotted before dispatch and no
//! lock is held while a handler runs, so handlers may freely subscribe,
//! unsubscribe, or publish again:
//!
//! - a handler subscribed during a publish is **not** called by that publish;
//! - a handler unsubscribed during a publish is **not** called if it had not
//!   been reached yet.
//!
//! There is no replay: a publish with no subscribers is lost.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::trace;

type Handler = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
struct Entry {
    id: u64,
    active: Arc<AtomicBool>,
    handler: Handler,
}

#[derive(Default)]
struct Topics {
    subscribers: DashMap<String, Vec<Entry>>,
    next_id: AtomicU64,
}

impl Topics {
    fn remove(&self, topic: &str, id: u64) {
        let now_empty = self.subscribers.get_mut(topic).is_some_and(|mut entries| {
            entries.retain(|entry| entry.id != id);
            entries.is_empty()
        });
        if now_empty {
            self.subscribers.remove_if(topic, |_, entries| entries.is_empty());
        }
    }
}

/// A publish/subscribe channel keyed by topic.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct InvalidationBus {
    topics: Arc<Topics>,
}

impl fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationBus")
            .field("topics", &self.topics.subscribers.len())
            .finish()
    }
}

impl InvalidationBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `topic`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or [`Subscription::unsubscribe`] is called.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = self.topics.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        self.topics
            .subscribers
            .entry(topic.clone())
            .or_default()
            .push(Entry {
                id,
                active: Arc::clone(&active),
                handler: Arc::new(handler),
            });
        trace!(%topic, subscription = id, "subscribed");

        Subscription {
            topics: Arc::clone(&self.topics),
            topic,
            id,
            active,
        }
    }

    /// Notifies every handler subscribed to `topic` and returns how many ran.
    pub fn publish(&self, topic: &str) -> usize {
        let snapshot: Vec<Entry> = match self.topics.subscribers.get(topic) {
            Some(entries) => entries.clone(),
            None => Vec::new(),
        };
        if snapshot.is_empty() {
            trace!(%topic, "publish with no subscribers");
            return 0;
        }

        let mut delivered = 0;
        for entry in snapshot {
            if entry.active.load(Ordering::Acquire) {
                (entry.handler)();
                delivered += 1;
            }
        }
        trace!(%topic, delivered, "published");
        delivered
    }

    /// Returns the number of handlers currently subscribed to `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .subscribers
            .get(topic)
            .map_or(0, |entries| entries.len())
    }
}

/// Keeps a handler registered on an [`InvalidationBus`].
pub struct Subscription {
    topics: Arc<Topics>,
    topic: String,
    id: u64,
    active: Arc<AtomicBool>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Removes the handler. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Flag first so an in-progress publish skips this handler.
        self.active.store(false, Ordering::Release);
        self.topics.remove(&self.topic, self.id);
        trace!(topic = %self.topic, subscription = self.id, "unsubscribed");
    }
}
