use std::{fmt, time::SystemTime};

use serde_json::Value;
use uuid::Uuid;

use crate::RoutingKey;

/// A message captured from the bus.
///
/// Created by the subscription registry at delivery time and appended to the
/// per-key message buffer. Messages are immutable; they live until the buffer
/// is reset at a test boundary. The body is an opaque, caller-defined payload.
///
/// Every buffered message travels as `Arc<Message>` so that wait loops can
/// snapshot the buffer without copying payloads.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct Message {
    routing_key: RoutingKey,
    body: Value,
    received_at: SystemTime,
}

impl Message {
    /// Construct a message as received on the given routing key now.
    pub fn new(routing_key: RoutingKey, body: Value) -> Self {
        Self {
            routing_key,
            body,
            received_at: SystemTime::now(),
        }
    }

    /// The routing key this message was delivered on.
    #[inline]
    pub fn routing_key(&self) -> &RoutingKey {
        &self.routing_key
    }

    /// The opaque message payload.
    ///
    /// This is the value predicates typically inspect:
    ///
    /// ```ignore
    /// Predicate::new("id == 42", |m| m.body()["id"] == 42)
    /// ```
    #[inline]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// When the subscription registry received this message.
    #[inline]
    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("routing_key", &self.routing_key)
            .field("body", &self.body)
            .field("received_at", &self.received_at)
            .finish()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message {{ key: {}, body: {} }}", self.routing_key, self.body)
    }
}

/// Per-delivery metadata handed to user handlers alongside the [`Message`].
///
/// Carries the correlation id assigned by the transport (or generated at the
/// registry boundary when the transport provides none), the routing key, and
/// the receive timestamp.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    correlation_id: Uuid,
    routing_key: RoutingKey,
    received_at: SystemTime,
}

impl DeliveryContext {
    pub fn new(correlation_id: Uuid, routing_key: RoutingKey) -> Self {
        Self {
            correlation_id,
            routing_key,
            received_at: SystemTime::now(),
        }
    }

    /// Generate a context with a fresh correlation id.
    pub fn generate(routing_key: RoutingKey) -> Self {
        Self::new(Uuid::new_v4(), routing_key)
    }

    /// Correlation id linking this delivery to the originating send.
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// The routing key this delivery arrived on.
    pub fn routing_key(&self) -> &RoutingKey {
        &self.routing_key
    }

    /// When the delivery entered the registry.
    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_accessors() {
        let msg = Message::new("order.created".into(), json!({"id": 42}));
        assert_eq!(msg.routing_key().as_str(), "order.created");
        assert_eq!(msg.body()["id"], 42);
    }

    #[test]
    fn message_display_includes_key_and_body() {
        let msg = Message::new("ping".into(), json!({"n": 1}));
        let s = msg.to_string();
        assert!(s.contains("ping"));
        assert!(s.contains("\"n\":1"));
    }

    #[test]
    fn generated_contexts_get_distinct_correlation_ids() {
        let a = DeliveryContext::generate("k".into());
        let b = DeliveryContext::generate("k".into());
        assert_ne!(a.correlation_id(), b.correlation_id());
    }
}
