use std::{fmt, future::Future, time::Duration};

use futures_util::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::{CorrelationResult, DeliveryContext, RoutingKey};

/// A bus-level failure reported by the transport.
///
/// Carries the code string the bus reported (if any), the failure payload,
/// and a human-readable description. Send operations never propagate this as
/// an error; the correlator folds it into a [`CorrelationResult`] via
/// [`CorrelationResult::from_failure`]. Connection plumbing (`connect`,
/// `close`, `subscribe`) does propagate it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("bus failure (code {code:?}): {message}")]
pub struct TransportFailure {
    /// The code the bus reported, e.g. `"503"`. `None` maps to status 500.
    pub code: Option<String>,
    /// The failure payload, surfaced as the result body.
    pub body: Value,
    /// Human-readable failure description.
    pub message: String,
}

impl TransportFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            body: Value::Null,
            message: message.into(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

/// Caller-supplied metadata threaded through a send operation.
#[derive(Debug, Clone, Default)]
pub struct SendContext {
    correlation_id: Option<Uuid>,
    timeout: Option<Duration>,
}

impl SendContext {
    /// Pin the correlation id instead of letting the transport assign one.
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Per-send timeout override, passed through to the transport.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn correlation_id(&self) -> Option<Uuid> {
        self.correlation_id
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// An inbound delivery callback installed via [`BusTransport::subscribe`].
///
/// The subscription registry builds exactly one of these per routing key; it
/// appends the payload to the message buffer before forwarding to user logic.
/// The returned result tells the transport whether to ack (Ok) or signal a
/// domain error (Err) for this delivery.
pub type DeliveryHandler = Box<
    dyn Fn(Value, DeliveryContext) -> BoxFuture<'static, Result<CorrelationResult, TransportFailure>>
        + Send
        + Sync,
>;

/// The transport port this crate consumes.
///
/// Implementations own the wire protocol, channel/queue topology,
/// authentication, and wire-level retries; this crate only issues the calls
/// below. Methods return futures but can be implemented as `async fn`
/// directly; no `#[async_trait]` macro is required.
///
/// `request` is point-to-point (the response body comes back to the caller);
/// `command` and `event` are fire-and-acknowledge. All three report bus-level
/// failures as [`TransportFailure`], which the correlator folds into a
/// [`CorrelationResult`] rather than propagating.
pub trait BusTransport: Send + Sync + 'static {
    /// Whether the transport currently holds a live connection.
    fn is_running(&self) -> bool;

    /// Establish the connection. Must be idempotent when already connected.
    fn connect(&self) -> impl Future<Output = Result<(), TransportFailure>> + Send;

    /// Close the connection and release subscriptions. Must be idempotent
    /// when already closed.
    fn close(&self) -> impl Future<Output = Result<(), TransportFailure>> + Send;

    /// Point-to-point request; resolves with the response body.
    fn request(
        &self,
        routing_key: &RoutingKey,
        payload: Value,
        ctx: &SendContext,
    ) -> impl Future<Output = Result<Value, TransportFailure>> + Send;

    /// Fire a command; resolves with the acknowledgement body.
    fn command(
        &self,
        routing_key: &RoutingKey,
        payload: Value,
        ctx: &SendContext,
    ) -> impl Future<Output = Result<Value, TransportFailure>> + Send;

    /// Publish an event; resolves with the acknowledgement body.
    fn event(
        &self,
        routing_key: &RoutingKey,
        payload: Value,
        ctx: &SendContext,
    ) -> impl Future<Output = Result<Value, TransportFailure>> + Send;

    /// Install a delivery callback for a routing key.
    ///
    /// The registry guarantees at most one call per key per connection.
    fn subscribe(
        &self,
        routing_key: &RoutingKey,
        handler: DeliveryHandler,
    ) -> impl Future<Output = Result<(), TransportFailure>> + Send;
}

impl fmt::Display for SendContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SendContext {{ correlation_id: {:?}, timeout: {:?} }}",
            self.correlation_id, self.timeout
        )
    }
}
