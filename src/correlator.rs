use std::sync::Arc;

use serde_json::{Value, json};

use crate::{
    CorrelationResult, RoutingKey,
    log_sink::{LogRecord, LogSink},
    transport::{BusTransport, SendContext, TransportFailure},
};

/// Wraps transport sends and normalizes success/failure into a uniform
/// [`CorrelationResult`] envelope.
///
/// The correlator never returns `Err` for transport-level failures; a bus
/// failure becomes a result with `status >= 400` so that "expect an error
/// response" tests assert on `status`/`body` instead of handling errors in
/// control flow. When the helper runs without a transport (disabled), all
/// sends resolve immediately with an empty result.
pub struct Correlator<T> {
    transport: Option<Arc<T>>,
    sink: Arc<dyn LogSink>,
}

impl<T: BusTransport> Correlator<T> {
    pub fn new(transport: Arc<T>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            transport: Some(transport),
            sink,
        }
    }

    /// A correlator with no transport: every send is an immediate no-op.
    pub fn detached(sink: Arc<dyn LogSink>) -> Self {
        Self {
            transport: None,
            sink,
        }
    }

    /// Point-to-point request; the response body lands in the result.
    pub async fn send_request(
        &self,
        routing_key: &RoutingKey,
        data: Value,
        ctx: &SendContext,
    ) -> CorrelationResult {
        self.log_send("Send bus request", routing_key, &data);
        match &self.transport {
            Some(transport) => fold(transport.request(routing_key, data, ctx).await),
            None => CorrelationResult::empty(),
        }
    }

    /// Fire a command.
    pub async fn send_command(
        &self,
        routing_key: &RoutingKey,
        data: Value,
        ctx: &SendContext,
    ) -> CorrelationResult {
        self.log_send("Send bus command", routing_key, &data);
        match &self.transport {
            Some(transport) => fold(transport.command(routing_key, data, ctx).await),
            None => CorrelationResult::empty(),
        }
    }

    /// Publish an event.
    pub async fn send_event(
        &self,
        routing_key: &RoutingKey,
        data: Value,
        ctx: &SendContext,
    ) -> CorrelationResult {
        self.log_send("Send bus event", routing_key, &data);
        match &self.transport {
            Some(transport) => fold(transport.event(routing_key, data, ctx).await),
            None => CorrelationResult::empty(),
        }
    }

    fn log_send(&self, title: &str, routing_key: &RoutingKey, data: &Value) {
        self.sink.emit(LogRecord::new(
            title,
            json!({
                "routingKey": routing_key.as_str(),
                "body": data,
            }),
        ));
    }
}

fn fold(outcome: Result<Value, TransportFailure>) -> CorrelationResult {
    match outcome {
        Ok(body) => CorrelationResult::success(body),
        Err(failure) => CorrelationResult::from_failure(failure),
    }
}

impl<T> std::fmt::Debug for Correlator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("attached", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::log_sink::NullSink;
    use crate::testing::MockTransport;

    fn correlator(transport: &MockTransport) -> Correlator<MockTransport> {
        Correlator::new(Arc::new(transport.clone()), Arc::new(NullSink))
    }

    #[tokio::test]
    async fn successful_request_resolves_with_status_200() {
        let transport = MockTransport::new();
        transport.script_response("ping", Ok(json!({"pong": true})));

        let result = correlator(&transport)
            .send_request(&"ping".into(), json!({}), &SendContext::default())
            .await;

        assert_eq!(result.status(), 200);
        assert_eq!(result.body()["pong"], true);
    }

    #[tokio::test]
    async fn bus_failure_becomes_a_result_not_an_error() {
        let transport = MockTransport::new();
        transport.script_response(
            "ping",
            Err(TransportFailure::new("503", "unavailable").with_body(json!({"retry": true}))),
        );

        let result = correlator(&transport)
            .send_request(&"ping".into(), json!({}), &SendContext::default())
            .await;

        assert_eq!(result.status(), 503);
        assert_eq!(result.body()["retry"], true);
        assert_eq!(result.error_info().unwrap().code.as_deref(), Some("503"));
    }

    #[tokio::test]
    async fn command_and_event_use_their_transport_primitives() {
        let transport = MockTransport::new();
        let correlator = correlator(&transport);

        correlator
            .send_command(&"order.place".into(), json!({"id": 1}), &SendContext::default())
            .await;
        correlator
            .send_event(&"order.audit".into(), json!({"id": 1}), &SendContext::default())
            .await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].kind, "command");
        assert_eq!(sent[1].kind, "event");
    }

    #[tokio::test]
    async fn detached_correlator_resolves_immediately_with_empty_result() {
        let correlator: Correlator<MockTransport> = Correlator::detached(Arc::new(NullSink));

        let result = correlator
            .send_request(&"ping".into(), json!({}), &SendContext::default())
            .await;

        assert_eq!(result.status(), 200);
        assert!(result.body().is_null());
    }

    #[tokio::test]
    async fn sends_emit_structured_log_records() {
        struct Capture(Mutex<Vec<LogRecord>>);
        impl LogSink for Capture {
            fn emit(&self, record: LogRecord) {
                self.0.lock().unwrap().push(record);
            }
        }

        let transport = MockTransport::new();
        let sink = Arc::new(Capture(Mutex::new(Vec::new())));
        let correlator = Correlator::new(Arc::new(transport), sink.clone());

        correlator
            .send_request(&"ping".into(), json!({"n": 1}), &SendContext::default())
            .await;

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Send bus request");
        assert_eq!(records[0].value["routingKey"], "ping");
        assert_eq!(records[0].value["body"]["n"], 1);
    }
}
