//! Eventual assertions over the message buffer.
//!
//! [`MessageExpectation`] implements "wait until some buffered message
//! satisfies a predicate"; [`NoMessageExpectation`] implements "assert no
//! buffered message satisfies a predicate within a window". Both are created
//! by [`BusHelper`](crate::BusHelper), override their bounds with
//! [`within`](MessageExpectation::within), and run when awaited.
//!
//! Waiting polls rather than listening: delivery timing relative to the
//! assertion call is unknown, and a predicate may only become true after
//! several deliveries. Each wait call owns its own progress cursor and
//! timer, so concurrent waits on different routing keys do not interfere.

use std::{
    fmt,
    future::IntoFuture,
    sync::Arc,
    time::Duration,
};

use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    Error, Message, MessageBuffer, Result, RoutingKey,
    log_sink::{LogRecord, LogSink},
    predicate::{MessagePredicate, PredicateOutcome},
};

/// A positive eventual assertion: some buffered message matches.
///
/// Created by [`BusHelper::expect_message`](crate::BusHelper::expect_message).
/// Polls the buffer entry for the routing key on a fixed interval, evaluating
/// the predicate **at most once per message**: the buffer is an append-only
/// log, so positions already evaluated-and-rejected are tracked by a cursor
/// and never re-checked. Resolves with the first (lowest-index) matching
/// message.
///
/// # Example
///
/// ```ignore
/// let msg = helper
///     .expect_message("order.created", Predicate::new("id == 42", |m| m.body()["id"] == 42))
///     .within(Duration::from_millis(500))
///     .await?;
/// assert_eq!(msg.body()["id"], 42);
/// ```
pub struct MessageExpectation<P> {
    buffer: Arc<MessageBuffer>,
    sink: Arc<dyn LogSink>,
    routing_key: RoutingKey,
    predicate: P,
    timeout: Duration,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl<P: MessagePredicate> MessageExpectation<P> {
    pub(crate) fn new(
        buffer: Arc<MessageBuffer>,
        sink: Arc<dyn LogSink>,
        routing_key: RoutingKey,
        predicate: P,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            buffer,
            sink,
            routing_key,
            predicate,
            timeout,
            poll_interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Override the configured timeout.
    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the configured poll interval.
    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Tie this wait to a parent cancellation token.
    ///
    /// When the token fires, the poll loop exits cleanly with
    /// [`Error::WaitCancelled`] instead of leaking a timer.
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    async fn run(self) -> Result<Arc<Message>> {
        // Precondition: the key must have an active subscription. Fails
        // immediately, without polling.
        if !self.buffer.contains(&self.routing_key) {
            return Err(Error::NotSubscribed(self.routing_key));
        }

        let deadline = Instant::now() + self.timeout;
        // The entry is append-only, so "positions already evaluated and
        // rejected" reduces to a cursor over the log.
        let mut next_unseen = 0usize;

        loop {
            match self.scan(&mut next_unseen) {
                Scan::Match(message) => {
                    self.log_outcome();
                    return Ok(message);
                }
                Scan::PredicateFailed(err) => {
                    // Captured, not propagated mid-scan: a failing predicate
                    // halts polling but is surfaced as its own failure, never
                    // as "no match yet".
                    self.log_outcome();
                    return Err(Error::predicate_failed(
                        self.routing_key.clone(),
                        err,
                        self.buffer.last(&self.routing_key),
                    ));
                }
                Scan::NoMatch => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.log_outcome();
                return Err(Error::WaitTimeout {
                    routing_key: self.routing_key.clone(),
                    predicate: self.predicate.describe().to_string(),
                    timeout: self.timeout,
                    last_message: self.buffer.last(&self.routing_key),
                });
            }

            let pause = self.poll_interval.min(remaining);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::WaitCancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Evaluate the predicate over every not-yet-seen buffer position, in
    /// arrival order. The earliest position that either matches or fails
    /// decides the outcome; first occurrence wins.
    fn scan(&self, next_unseen: &mut usize) -> Scan {
        let entry = self.buffer.snapshot(&self.routing_key).unwrap_or_default();

        while *next_unseen < entry.len() {
            let message = &entry[*next_unseen];
            *next_unseen += 1;

            match PredicateOutcome::evaluate(&self.predicate, message) {
                PredicateOutcome::Match => return Scan::Match(message.clone()),
                PredicateOutcome::Failed(err) => return Scan::PredicateFailed(err),
                PredicateOutcome::NoMatch => {}
            }
        }
        Scan::NoMatch
    }

    fn log_outcome(&self) {
        self.sink.emit(LogRecord::new(
            format!(
                "Wait message with predicate for routing key {}",
                self.routing_key
            ),
            json!(self.predicate.describe()),
        ));
        let last = self
            .buffer
            .last(&self.routing_key)
            .map_or(serde_json::Value::Null, |msg| msg.body().clone());
        self.sink.emit(LogRecord::new("Latest message", last));
    }
}

enum Scan {
    Match(Arc<Message>),
    NoMatch,
    PredicateFailed(crate::predicate::PredicateError),
}

impl<P: MessagePredicate + Send + 'static> IntoFuture for MessageExpectation<P> {
    type Output = Result<Arc<Message>>;
    type IntoFuture =
        std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl<P: MessagePredicate> fmt::Debug for MessageExpectation<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageExpectation")
            .field("routing_key", &self.routing_key)
            .field("predicate", &self.predicate.describe())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A negative eventual assertion: no buffered message matches within the
/// window.
///
/// Created by
/// [`BusHelper::expect_no_message`](crate::BusHelper::expect_no_message).
/// Unlike the positive wait, this cannot short-circuit on "currently no
/// match"; a matching message could still arrive. It waits out the
/// **entire** window, then scans the full entry once, first match wins.
pub struct NoMessageExpectation<P> {
    buffer: Arc<MessageBuffer>,
    routing_key: RoutingKey,
    predicate: P,
    timeout: Duration,
    cancel: CancellationToken,
}

impl<P: MessagePredicate> NoMessageExpectation<P> {
    pub(crate) fn new(
        buffer: Arc<MessageBuffer>,
        routing_key: RoutingKey,
        predicate: P,
        timeout: Duration,
    ) -> Self {
        Self {
            buffer,
            routing_key,
            predicate,
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Override the configured watch window.
    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tie this wait to a parent cancellation token.
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    async fn run(self) -> Result<()> {
        if !self.buffer.contains(&self.routing_key) {
            return Err(Error::NotSubscribed(self.routing_key));
        }

        tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::WaitCancelled),
            _ = tokio::time::sleep(self.timeout) => {}
        }

        let entry = self.buffer.snapshot(&self.routing_key).unwrap_or_default();
        for message in &entry {
            match PredicateOutcome::evaluate(&self.predicate, message) {
                PredicateOutcome::Match => {
                    return Err(Error::UnexpectedMatch {
                        routing_key: self.routing_key.clone(),
                        message: message.clone(),
                    });
                }
                PredicateOutcome::Failed(err) => {
                    return Err(Error::predicate_failed(
                        self.routing_key.clone(),
                        err,
                        entry.last().cloned(),
                    ));
                }
                PredicateOutcome::NoMatch => {}
            }
        }
        Ok(())
    }
}

impl<P: MessagePredicate + Send + 'static> IntoFuture for NoMessageExpectation<P> {
    type Output = Result<()>;
    type IntoFuture =
        std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl<P: MessagePredicate> fmt::Debug for NoMessageExpectation<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoMessageExpectation")
            .field("routing_key", &self.routing_key)
            .field("predicate", &self.predicate.describe())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
