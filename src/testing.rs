//! In-memory transport double for testing the helper itself.
//!
//! Enable with the `mock-transport` feature:
//!
//! ```toml
//! [dev-dependencies]
//! busprobe = { version = "0.1", features = ["mock-transport"] }
//! ```
//!
//! [`MockTransport`] implements [`BusTransport`](crate::BusTransport)
//! entirely in memory: responses are scripted per routing key, inbound
//! deliveries are injected manually with [`deliver`](MockTransport::deliver),
//! and every send is recorded for inspection.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.script_response("ping", Err(TransportFailure::new("503", "unavailable")));
//!
//! let helper = BusHelper::new(config, transport)?;
//! let result = helper.send_request("ping", json!({}), SendContext::default()).await;
//! assert_eq!(result.status(), 503);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::{
    CorrelationResult, DeliveryContext, RoutingKey,
    transport::{BusTransport, DeliveryHandler, SendContext, TransportFailure},
};

type ScriptedOutcome = Result<Value, TransportFailure>;

#[derive(Default)]
struct MockState {
    responses: HashMap<RoutingKey, VecDeque<ScriptedOutcome>>,
    sent: Vec<SentRecord>,
    handlers: HashMap<RoutingKey, Arc<DeliveryHandler>>,
}

/// One recorded outbound send.
#[derive(Debug, Clone)]
pub struct SentRecord {
    /// `"request"`, `"command"`, or `"event"`.
    pub kind: &'static str,
    pub routing_key: RoutingKey,
    pub payload: Value,
}

/// A scriptable in-memory [`BusTransport`].
///
/// Cloneable handle: clones share state, so tests can keep a handle after
/// moving the transport into a [`BusHelper`](crate::BusHelper).
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    running: Arc<AtomicBool>,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next send on a routing key.
    ///
    /// Outcomes are consumed in order; once the queue is empty, sends
    /// resolve with `Ok(Value::Null)`.
    pub fn script_response(&self, routing_key: impl Into<RoutingKey>, outcome: ScriptedOutcome) {
        self.lock()
            .responses
            .entry(routing_key.into())
            .or_default()
            .push_back(outcome);
    }

    /// Inject an inbound delivery, invoking the handler installed for the
    /// key.
    ///
    /// Returns the handler's ack/nack outcome, or `Err` when nothing is
    /// subscribed to the key.
    pub async fn deliver(
        &self,
        routing_key: impl Into<RoutingKey>,
        payload: Value,
    ) -> Result<CorrelationResult, TransportFailure> {
        let routing_key = routing_key.into();
        let handler = self.lock().handlers.get(&routing_key).cloned();
        match handler {
            Some(handler) => {
                let ctx = DeliveryContext::generate(routing_key);
                (*handler)(payload, ctx).await
            }
            None => Err(TransportFailure {
                code: None,
                body: Value::Null,
                message: format!("no subscription for {routing_key}"),
            }),
        }
    }

    /// All recorded outbound sends, in order.
    pub fn sent(&self) -> Vec<SentRecord> {
        self.lock().sent.clone()
    }

    /// Number of sends (any kind) targeting a routing key.
    pub fn send_count(&self, routing_key: impl Into<RoutingKey>) -> usize {
        let key = routing_key.into();
        self.lock().sent.iter().filter(|r| r.routing_key == key).count()
    }

    /// Whether a handler is installed for a routing key.
    pub fn has_subscription(&self, routing_key: impl Into<RoutingKey>) -> bool {
        self.lock().handlers.contains_key(&routing_key.into())
    }

    /// How many times `connect` was called.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// How many times `close` was called.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&self, kind: &'static str, routing_key: &RoutingKey, payload: Value) -> ScriptedOutcome {
        let mut state = self.lock();
        state.sent.push(SentRecord {
            kind,
            routing_key: routing_key.clone(),
            payload: payload.clone(),
        });
        state
            .responses
            .get_mut(routing_key)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(Value::Null))
    }
}

impl BusTransport for MockTransport {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<(), TransportFailure> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportFailure> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn request(
        &self,
        routing_key: &RoutingKey,
        payload: Value,
        _ctx: &SendContext,
    ) -> Result<Value, TransportFailure> {
        self.send("request", routing_key, payload)
    }

    async fn command(
        &self,
        routing_key: &RoutingKey,
        payload: Value,
        _ctx: &SendContext,
    ) -> Result<Value, TransportFailure> {
        self.send("command", routing_key, payload)
    }

    async fn event(
        &self,
        routing_key: &RoutingKey,
        payload: Value,
        _ctx: &SendContext,
    ) -> Result<Value, TransportFailure> {
        self.send("event", routing_key, payload)
    }

    async fn subscribe(
        &self,
        routing_key: &RoutingKey,
        handler: DeliveryHandler,
    ) -> Result<(), TransportFailure> {
        self.lock().handlers.insert(routing_key.clone(), Arc::new(handler));
        Ok(())
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
