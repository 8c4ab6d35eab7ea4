use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Message, RoutingKey};

/// Per-routing-key ordered log of received messages, scoped to the current
/// test.
///
/// Entries are allocated explicitly by [`register`](Self::register) when a
/// subscription is installed, so "not subscribed" (no entry) is a reachable,
/// testable state distinct from "subscribed but nothing received yet"
/// (empty entry). Messages are append-only and preserved in arrival order;
/// nothing is removed individually, only bulk-cleared by
/// [`reset`](Self::reset) at test boundaries.
///
/// The buffer is single-writer (the subscription registry appends, the
/// lifecycle binder resets) and multi-reader (wait loops snapshot). A mutex
/// guards access so appends are atomic with respect to reads; critical
/// sections are short and never held across await points.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    entries: Mutex<HashMap<RoutingKey, Vec<Arc<Message>>>>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an empty entry for a routing key if one does not exist.
    ///
    /// Idempotent; called by the registry at subscribe time.
    pub fn register(&self, routing_key: &RoutingKey) {
        self.lock().entry(routing_key.clone()).or_default();
    }

    /// Append a delivered message to its key's entry, creating the entry if
    /// it is missing.
    ///
    /// Entries are normally created by [`register`](Self::register), but a
    /// delivery can race ahead of registration on a fresh connection; the
    /// entry is created here in that case rather than dropping the message.
    pub fn append(&self, message: Message) -> Arc<Message> {
        let message = Arc::new(message);
        self.lock()
            .entry(message.routing_key().clone())
            .or_default()
            .push(message.clone());
        message
    }

    /// Whether an entry exists for this routing key (i.e. it was subscribed).
    pub fn contains(&self, routing_key: &RoutingKey) -> bool {
        self.lock().contains_key(routing_key)
    }

    /// A point-in-time copy of the entry for this routing key.
    ///
    /// Returns `None` when the key was never registered, which callers must
    /// distinguish from `Some` with an empty vec.
    pub fn snapshot(&self, routing_key: &RoutingKey) -> Option<Vec<Arc<Message>>> {
        self.lock().get(routing_key).cloned()
    }

    /// The most recently buffered message for this routing key, if any.
    pub fn last(&self, routing_key: &RoutingKey) -> Option<Arc<Message>> {
        self.lock().get(routing_key).and_then(|entry| entry.last().cloned())
    }

    /// Number of buffered messages for this routing key (0 when never
    /// registered).
    pub fn len(&self, routing_key: &RoutingKey) -> usize {
        self.lock().get(routing_key).map_or(0, Vec::len)
    }

    /// Drop all entries and their messages.
    ///
    /// Called at test boundaries; guarantees no cross-test leakage of
    /// captured messages.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RoutingKey, Vec<Arc<Message>>>> {
        // A poisoned lock only means another test thread panicked mid-append;
        // the map itself is still structurally sound.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_entry_is_distinct_from_empty_entry() {
        let buffer = MessageBuffer::new();
        let key: RoutingKey = "order.created".into();

        assert!(buffer.snapshot(&key).is_none());

        buffer.register(&key);
        assert_eq!(buffer.snapshot(&key).unwrap().len(), 0);
    }

    #[test]
    fn append_preserves_arrival_order() {
        let buffer = MessageBuffer::new();
        let key: RoutingKey = "order.created".into();
        buffer.register(&key);

        for i in 0..5 {
            buffer.append(Message::new(key.clone(), json!({"id": i})));
        }

        let entry = buffer.snapshot(&key).unwrap();
        assert_eq!(entry.len(), 5);
        for (i, msg) in entry.iter().enumerate() {
            assert_eq!(msg.body()["id"], i);
        }
        assert_eq!(buffer.last(&key).unwrap().body()["id"], 4);
    }

    #[test]
    fn append_creates_entry_when_delivery_races_registration() {
        let buffer = MessageBuffer::new();
        let key: RoutingKey = "early.bird".into();

        buffer.append(Message::new(key.clone(), json!(1)));
        assert!(buffer.contains(&key));
        assert_eq!(buffer.len(&key), 1);
    }

    #[test]
    fn reset_drops_all_entries() {
        let buffer = MessageBuffer::new();
        let key: RoutingKey = "order.created".into();
        buffer.register(&key);
        buffer.append(Message::new(key.clone(), json!({"id": 1})));

        buffer.reset();

        assert!(buffer.snapshot(&key).is_none());
        assert!(buffer.last(&key).is_none());
    }

    #[test]
    fn register_is_idempotent() {
        let buffer = MessageBuffer::new();
        let key: RoutingKey = "k".into();
        buffer.register(&key);
        buffer.append(Message::new(key.clone(), json!(1)));
        buffer.register(&key);
        assert_eq!(buffer.len(&key), 1);
    }
}
