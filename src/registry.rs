use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::BoxFuture;
use serde_json::json;

use crate::{
    CorrelationResult, DeliveryContext, Message, MessageBuffer, Result, RoutingKey,
    log_sink::{LogRecord, LogSink},
    transport::{BusTransport, DeliveryHandler, TransportFailure},
};

/// Boxed future returned by a user message handler.
pub type HandlerFuture = BoxFuture<'static, CorrelationResult>;

/// User logic invoked for each delivery, after the message is buffered.
///
/// The handler's return is interpreted as a [`CorrelationResult`]-shaped
/// value; a `status >= 400` makes the registry signal a domain error back to
/// the transport (nack/requeue semantics stay on the transport side).
pub type MessageHandler =
    Arc<dyn Fn(Arc<Message>, DeliveryContext) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`MessageHandler`].
///
/// # Example
///
/// ```ignore
/// let handler = handler_fn(|msg, _ctx| async move {
///     println!("got {}", msg.body());
///     CorrelationResult::empty()
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(Arc<Message>, DeliveryContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CorrelationResult> + Send + 'static,
{
    Arc::new(move |msg, ctx| Box::pin(f(msg, ctx)))
}

/// The default handler: acknowledge every delivery with an empty success.
pub fn ack_handler() -> MessageHandler {
    handler_fn(|_msg, _ctx| async { CorrelationResult::empty() })
}

/// Per-subscription options.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
    /// Emit a "message received" log record for each delivery.
    /// Default: true
    pub logging: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self { logging: true }
    }
}

/// Maps routing keys to active handlers and feeds the message buffer.
///
/// The registry wraps the underlying transport subscription exactly once per
/// key: repeated `subscribe` calls for the same key within a test scope reuse
/// the existing wire subscription, so delivered messages are never
/// duplicated. Each inbound delivery is appended to the buffer *before* the
/// user handler runs, so wait loops observe every message even when handlers
/// are slow or absent.
pub struct SubscriptionRegistry<T> {
    transport: Arc<T>,
    buffer: Arc<MessageBuffer>,
    sink: Arc<dyn LogSink>,
    subscribed: Mutex<HashSet<RoutingKey>>,
}

impl<T: BusTransport> SubscriptionRegistry<T> {
    pub fn new(transport: Arc<T>, buffer: Arc<MessageBuffer>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            transport,
            buffer,
            sink,
            subscribed: Mutex::new(HashSet::new()),
        }
    }

    /// Register interest in a routing key.
    ///
    /// Allocates the buffer slot for the key and installs a delivery wrapper
    /// on the transport. Idempotent per key: a second call within the same
    /// scope only re-registers the buffer slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) when the wire
    /// subscription cannot be installed.
    pub async fn subscribe(
        &self,
        routing_key: RoutingKey,
        handler: MessageHandler,
        options: SubscribeOptions,
    ) -> Result<()> {
        self.buffer.register(&routing_key);

        // Claim the key before awaiting so a concurrent subscribe for the
        // same key cannot double-install the wire subscription.
        if !self.lock_subscribed().insert(routing_key.clone()) {
            return Ok(());
        }

        let wrapper = self.storing_handler(routing_key.clone(), handler, options);
        if let Err(failure) = self.transport.subscribe(&routing_key, wrapper).await {
            self.lock_subscribed().remove(&routing_key);
            return Err(failure.into());
        }
        Ok(())
    }

    /// Build the delivery wrapper: buffer append, optional log record, then
    /// the user handler, with `status >= 400` translated into the error
    /// shape the transport contract expects.
    fn storing_handler(
        &self,
        routing_key: RoutingKey,
        handler: MessageHandler,
        options: SubscribeOptions,
    ) -> DeliveryHandler {
        let buffer = self.buffer.clone();
        let sink = self.sink.clone();

        Box::new(move |payload, ctx| {
            let message = buffer.append(Message::new(routing_key.clone(), payload));

            if options.logging {
                sink.emit(LogRecord::new(
                    "Received bus message",
                    json!({
                        "routingKey": message.routing_key().as_str(),
                        "body": message.body(),
                    }),
                ));
            }

            let handler = handler.clone();
            Box::pin(async move {
                let result = handler(message, ctx).await;
                if result.is_success() {
                    Ok(result)
                } else {
                    Err(TransportFailure {
                        code: Some(result.status().to_string()),
                        body: result.body().clone(),
                        message: format!("handler rejected delivery with status {}", result.status()),
                    })
                }
            })
        })
    }

    /// Routing keys with a live wire subscription.
    pub fn subscribed_keys(&self) -> Vec<RoutingKey> {
        self.lock_subscribed().iter().cloned().collect()
    }

    /// Re-allocate buffer slots for every live subscription.
    ///
    /// Called by the lifecycle binder after a buffer reset so that a
    /// post-reset wait sees an empty history instead of "not subscribed",
    /// the wire subscription survives the reset, only captured messages are
    /// dropped.
    pub fn reregister_buffer_slots(&self) {
        for key in self.lock_subscribed().iter() {
            self.buffer.register(key);
        }
    }

    /// Forget all wire subscriptions.
    ///
    /// Called at suite teardown after the transport is closed; the transport
    /// owns releasing the actual channels.
    pub fn release(&self) {
        self.lock_subscribed().clear();
    }
}

impl<T> SubscriptionRegistry<T> {
    fn lock_subscribed(&self) -> MutexGuard<'_, HashSet<RoutingKey>> {
        self.subscribed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> std::fmt::Debug for SubscriptionRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscribed", &self.lock_subscribed().len())
            .finish_non_exhaustive()
    }
}
