use std::sync::Arc;

use serde_json::Value;

use crate::{
    Config, CorrelationResult, Message, MessageBuffer, Result, RoutingKey,
    correlator::Correlator,
    expectation::{MessageExpectation, NoMessageExpectation},
    log_sink::{LogSink, NullSink, TracingSink},
    predicate::MessagePredicate,
    registry::{MessageHandler, SubscribeOptions, SubscriptionRegistry},
    request_wait::{RequestWait, ResultPredicate},
    transport::{BusTransport, SendContext},
};

/// The process-wide bus test helper.
///
/// Owns the transport handle, the per-test message buffer, the subscription
/// registry, and the correlator, and exposes the operations test code calls:
///
/// - [`send_request`](Self::send_request) / [`send_command`](Self::send_command)
///   / [`send_event`](Self::send_event): fire and get a uniform
///   [`CorrelationResult`]
/// - [`subscribe`](Self::subscribe): start capturing deliveries for a key
/// - [`expect_message`](Self::expect_message) /
///   [`expect_no_message`](Self::expect_no_message): eventual assertions
///   over captured messages
/// - [`request_until`](Self::request_until): re-send a request until its
///   response satisfies a predicate
///
/// The transport handle is explicitly owned and explicitly lifetimed: it is
/// shared only with the correlator and the registry, and is torn down
/// deterministically by the [`LifecycleBinder`](crate::LifecycleBinder).
/// Test code never touches it directly.
///
/// # Example
///
/// ```ignore
/// let helper = BusHelper::new(
///     Config::default().with_host("rabbit.test").enabled(true),
///     transport,
/// )?;
///
/// helper.subscribe("order.created", ack_handler(), SubscribeOptions::default()).await?;
/// helper.send_command("order.place", json!({"id": 42}), SendContext::default()).await;
///
/// let msg = helper
///     .expect_message("order.created", Predicate::new("id == 42", |m| m.body()["id"] == 42))
///     .await?;
/// ```
pub struct BusHelper<T> {
    config: Config,
    transport: Option<Arc<T>>,
    buffer: Arc<MessageBuffer>,
    registry: Option<SubscriptionRegistry<T>>,
    correlator: Correlator<T>,
    sink: Arc<dyn LogSink>,
}

impl<T: BusTransport> BusHelper<T> {
    /// Build a helper around a transport, logging through [`TracingSink`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHost`](crate::Error::MissingHost) when the
    /// config is enabled without a host.
    pub fn new(config: Config, transport: T) -> Result<Self> {
        Self::with_sink(config, transport, Arc::new(TracingSink))
    }

    /// Build a helper with a custom log sink (e.g. a test-report collector).
    pub fn with_sink(config: Config, transport: T, sink: Arc<dyn LogSink>) -> Result<Self> {
        config.validate()?;
        if !config.enabled {
            return Ok(Self::disabled_with_config(config));
        }

        let transport = Arc::new(transport);
        let buffer = Arc::new(MessageBuffer::new());
        let registry =
            SubscriptionRegistry::new(transport.clone(), buffer.clone(), sink.clone());
        let correlator = Correlator::new(transport.clone(), sink.clone());

        Ok(Self {
            config,
            transport: Some(transport),
            buffer,
            registry: Some(registry),
            correlator,
            sink,
        })
    }

    /// An inert helper: every send resolves with an empty result, lifecycle
    /// hooks are no-ops, and subscriptions only allocate buffer slots.
    ///
    /// Lets suites run unchanged when no bus is available.
    pub fn disabled() -> Self {
        Self::disabled_with_config(Config::default())
    }

    fn disabled_with_config(config: Config) -> Self {
        let sink: Arc<dyn LogSink> = Arc::new(NullSink);
        Self {
            config,
            transport: None,
            buffer: Arc::new(MessageBuffer::new()),
            registry: None,
            correlator: Correlator::detached(sink.clone()),
            sink,
        }
    }

    /// Whether this helper is active (enabled config and a transport).
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether the transport currently holds a live connection.
    pub fn is_running(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_running())
    }

    /// The helper configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==================== Sending ====================

    /// Point-to-point request. Never returns `Err` for bus-level failures;
    /// inspect [`CorrelationResult::status`] instead.
    pub async fn send_request(
        &self,
        routing_key: impl Into<RoutingKey>,
        data: Value,
        ctx: SendContext,
    ) -> CorrelationResult {
        self.correlator.send_request(&routing_key.into(), data, &ctx).await
    }

    /// Fire a command.
    pub async fn send_command(
        &self,
        routing_key: impl Into<RoutingKey>,
        data: Value,
        ctx: SendContext,
    ) -> CorrelationResult {
        self.correlator.send_command(&routing_key.into(), data, &ctx).await
    }

    /// Publish an event.
    pub async fn send_event(
        &self,
        routing_key: impl Into<RoutingKey>,
        data: Value,
        ctx: SendContext,
    ) -> CorrelationResult {
        self.correlator.send_event(&routing_key.into(), data, &ctx).await
    }

    // ==================== Subscribing ====================

    /// Register interest in a routing key and start buffering its messages.
    ///
    /// Must be called before [`expect_message`](Self::expect_message) or
    /// [`expect_no_message`](Self::expect_no_message) for the key. Repeated
    /// calls within a test scope do not duplicate deliveries. On a disabled
    /// helper only the buffer slot is allocated.
    pub async fn subscribe(
        &self,
        routing_key: impl Into<RoutingKey>,
        handler: MessageHandler,
        options: SubscribeOptions,
    ) -> Result<()> {
        let routing_key = routing_key.into();
        match &self.registry {
            Some(registry) => registry.subscribe(routing_key, handler, options).await,
            None => {
                self.buffer.register(&routing_key);
                Ok(())
            }
        }
    }

    /// Messages captured so far for a routing key, in arrival order.
    ///
    /// `None` when the key was never subscribed.
    pub fn received(&self, routing_key: impl Into<RoutingKey>) -> Option<Vec<Arc<Message>>> {
        self.buffer.snapshot(&routing_key.into())
    }

    // ==================== Eventual assertions ====================

    /// Wait until some buffered message for the key satisfies the predicate.
    ///
    /// Returns a builder; `.await` runs it with the configured default
    /// timeout and poll interval, `.within()` overrides the bound.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let msg = helper
    ///     .expect_message("order.created", Predicate::new("id == 42", |m| m.body()["id"] == 42))
    ///     .within(Duration::from_millis(500))
    ///     .await?;
    /// ```
    pub fn expect_message<P: MessagePredicate>(
        &self,
        routing_key: impl Into<RoutingKey>,
        predicate: P,
    ) -> MessageExpectation<P> {
        MessageExpectation::new(
            self.buffer.clone(),
            self.sink.clone(),
            routing_key.into(),
            predicate,
            self.config.default_timeout,
            self.config.confirm_poll_interval,
        )
    }

    /// Assert that no buffered message for the key satisfies the predicate
    /// within the watch window.
    ///
    /// Waits the entire window before scanning; a matching message could
    /// still arrive on the final tick.
    pub fn expect_no_message<P: MessagePredicate>(
        &self,
        routing_key: impl Into<RoutingKey>,
        predicate: P,
    ) -> NoMessageExpectation<P> {
        NoMessageExpectation::new(
            self.buffer.clone(),
            routing_key.into(),
            predicate,
            self.config.default_timeout,
        )
    }

    /// Re-send a request each tick until its response satisfies the
    /// predicate.
    pub fn request_until(
        &self,
        routing_key: impl Into<RoutingKey>,
        payload: Value,
        predicate: ResultPredicate,
    ) -> RequestWait<'_, T> {
        RequestWait::new(
            &self.correlator,
            routing_key.into(),
            payload,
            predicate,
            self.config.request_wait_ceiling,
            self.config.request_poll_interval,
        )
    }

    // ==================== Lifecycle plumbing ====================

    /// Establish the transport connection. Idempotent; no-op when disabled.
    pub async fn connect(&self) -> Result<()> {
        match &self.transport {
            Some(transport) if !transport.is_running() => {
                transport.connect().await.map_err(Into::into)
            }
            _ => Ok(()),
        }
    }

    /// Close the transport and forget wire subscriptions. Idempotent; no-op
    /// when disabled.
    pub async fn disconnect(&self) -> Result<()> {
        let Some(transport) = &self.transport else {
            return Ok(());
        };
        if let Some(registry) = &self.registry {
            registry.release();
        }
        if transport.is_running() {
            transport.close().await?;
        }
        Ok(())
    }

    /// Drop all captured messages, keeping wire subscriptions alive.
    ///
    /// Buffer slots for live subscriptions are re-allocated so a post-reset
    /// wait sees an empty history rather than "not subscribed".
    pub fn reset_buffer(&self) {
        self.buffer.reset();
        if let Some(registry) = &self.registry {
            registry.reregister_buffer_slots();
        }
    }
}

impl<T> std::fmt::Debug for BusHelper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusHelper")
            .field("enabled", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{Error, Predicate, TransportFailure, ack_handler, testing::MockTransport};

    fn enabled_config() -> Config {
        Config::default().with_host("rabbit.test").enabled(true)
    }

    fn helper_with(transport: &MockTransport) -> BusHelper<MockTransport> {
        BusHelper::new(enabled_config(), transport.clone()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn no_delivery_times_out_after_the_bound() {
        // Scenario: subscribed, nothing arrives, wait 500ms.
        let transport = MockTransport::new();
        let helper = helper_with(&transport);
        helper
            .subscribe("order.created", ack_handler(), SubscribeOptions::default())
            .await
            .unwrap();

        let err = helper
            .expect_message("order.created", Predicate::new("id == 42", |m| m.body()["id"] == 42))
            .within(Duration::from_millis(500))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::WaitTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_matches_second_delivery_without_rechecking_first() {
        // Scenario: deliver {id: 1} then {id: 42}; the wait matches the
        // second message.
        let transport = MockTransport::new();
        let helper = helper_with(&transport);
        helper
            .subscribe("order.created", ack_handler(), SubscribeOptions::default())
            .await
            .unwrap();

        transport.deliver("order.created", json!({"id": 1})).await.unwrap();
        transport.deliver("order.created", json!({"id": 42})).await.unwrap();

        let msg = helper
            .expect_message("order.created", Predicate::new("id == 42", |m| m.body()["id"] == 42))
            .within(Duration::from_millis(500))
            .await
            .unwrap();

        assert_eq!(msg.body()["id"], 42);
        assert_eq!(helper.received("order.created").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn request_error_code_becomes_result_status() {
        // Scenario: the port errors with code "503".
        let transport = MockTransport::new();
        transport.script_response(
            "ping",
            Err(TransportFailure::new("503", "unavailable").with_body(json!({"down": true}))),
        );
        let helper = helper_with(&transport);

        let result = helper.send_request("ping", json!({}), SendContext::default()).await;
        assert_eq!(result.status(), 503);
        assert_eq!(result.body()["down"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_on_an_unsubscribed_key_is_a_configuration_error() {
        let transport = MockTransport::new();
        let helper = helper_with(&transport);

        let err = helper
            .expect_message("never.subscribed", Predicate::new("any", |_| true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSubscribed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn request_until_retries_the_send_each_tick() {
        let transport = MockTransport::new();
        // Two "pending" responses, then a "done" one.
        transport.script_response("job.status", Ok(json!({"state": "pending"})));
        transport.script_response("job.status", Ok(json!({"state": "pending"})));
        transport.script_response("job.status", Ok(json!({"state": "done"})));
        let helper = helper_with(&transport);

        let result = helper
            .request_until(
                "job.status",
                json!({"job": 7}),
                ResultPredicate::new("state == done", |r| r.body()["state"] == "done"),
            )
            .await
            .unwrap();

        assert_eq!(result.body()["state"], "done");
        assert_eq!(transport.send_count("job.status"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn request_until_times_out_at_the_ceiling() {
        let transport = MockTransport::new();
        let helper = helper_with(&transport);

        let err = helper
            .request_until(
                "job.status",
                json!({}),
                ResultPredicate::new("state == done", |r| r.body()["state"] == "done"),
            )
            .await
            .unwrap_err();

        match err {
            Error::RequestWaitTimeout { routing_key, predicate, timeout } => {
                assert_eq!(routing_key.as_str(), "job.status");
                assert_eq!(predicate, "state == done");
                assert_eq!(timeout, Duration::from_millis(2000));
            }
            other => panic!("expected RequestWaitTimeout, got {other}"),
        }
        // 2000ms ceiling at 250ms interval: the first send plus eight retries.
        assert_eq!(transport.send_count("job.status"), 9);
    }

    #[tokio::test]
    async fn disabled_helper_sends_resolve_with_empty_results() {
        let helper = BusHelper::<MockTransport>::disabled();

        let result = helper.send_request("ping", json!({}), SendContext::default()).await;
        assert_eq!(result.status(), 200);
        assert!(result.body().is_null());
        assert!(!helper.is_enabled());
        assert!(!helper.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_helper_subscribe_allocates_a_slot_only() {
        let helper = BusHelper::<MockTransport>::disabled();
        helper
            .subscribe("order.created", ack_handler(), SubscribeOptions::default())
            .await
            .unwrap();

        // Waits run against an empty history instead of failing with a
        // configuration error.
        let err = helper
            .expect_message("order.created", Predicate::new("any", |_| true))
            .within(Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WaitTimeout { .. }));
    }

    #[tokio::test]
    async fn enabled_config_without_host_is_rejected() {
        let err = BusHelper::new(Config::default().enabled(true), MockTransport::new()).unwrap_err();
        assert!(matches!(err, Error::MissingHost));
    }

    #[tokio::test(start_paused = true)]
    async fn buffer_reset_hides_pre_reset_messages_but_keeps_subscriptions() {
        let transport = MockTransport::new();
        let helper = helper_with(&transport);
        helper
            .subscribe("order.created", ack_handler(), SubscribeOptions::default())
            .await
            .unwrap();
        transport.deliver("order.created", json!({"id": 42})).await.unwrap();

        helper.reset_buffer();

        // Pre-reset message invisible, key still subscribed.
        let err = helper
            .expect_message("order.created", Predicate::new("id == 42", |m| m.body()["id"] == 42))
            .within(Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WaitTimeout { .. }));

        // New deliveries are captured again.
        transport.deliver("order.created", json!({"id": 42})).await.unwrap();
        let msg = helper
            .expect_message("order.created", Predicate::new("id == 42", |m| m.body()["id"] == 42))
            .within(Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(msg.body()["id"], 42);
    }
}
