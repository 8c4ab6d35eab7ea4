//! Retry-driven request waits.
//!
//! Request/response is point-to-point, not accumulated in the buffer, so
//! waiting for a satisfying response means *re-sending* the request on every
//! poll tick rather than re-scanning buffered messages.

use std::{fmt, future::IntoFuture, sync::Arc, time::Duration};

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    CorrelationResult, Error, Result, RoutingKey,
    correlator::Correlator,
    predicate::PredicateError,
    transport::{BusTransport, SendContext},
};

type ResultTestFn =
    Arc<dyn Fn(&CorrelationResult) -> std::result::Result<bool, PredicateError> + Send + Sync>;

/// A caller-supplied boolean test over a [`CorrelationResult`].
///
/// The request-wait counterpart of
/// [`Predicate`](crate::Predicate): a description paired with a closure over
/// the send result instead of a buffered message.
#[derive(Clone)]
pub struct ResultPredicate {
    description: String,
    test: ResultTestFn,
}

impl ResultPredicate {
    /// Build a result predicate from an infallible closure.
    pub fn new<F>(description: impl Into<String>, test: F) -> Self
    where
        F: Fn(&CorrelationResult) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            test: Arc::new(move |result| Ok(test(result))),
        }
    }

    /// Build a result predicate from a fallible closure.
    pub fn try_new<F>(description: impl Into<String>, test: F) -> Self
    where
        F: Fn(&CorrelationResult) -> std::result::Result<bool, PredicateError> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            test: Arc::new(test),
        }
    }

    pub fn describe(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for ResultPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultPredicate")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A wait that re-sends a request each tick until the response satisfies the
/// predicate.
///
/// Created by
/// [`BusHelper::request_until`](crate::BusHelper::request_until). Each tick
/// issues a fresh `send_request` and evaluates the predicate against its
/// [`CorrelationResult`]; the first truthy result resolves the wait. The
/// retry applies to the *send*, not to error interpretation. A response
/// with `status >= 400` is still handed to the predicate, which may well be
/// waiting for exactly that.
///
/// # Example
///
/// ```ignore
/// let result = helper
///     .request_until(
///         "inventory.check",
///         json!({"sku": "A-17"}),
///         ResultPredicate::new("in stock", |r| r.body()["available"] == true),
///     )
///     .await?;
/// ```
pub struct RequestWait<'a, T> {
    correlator: &'a Correlator<T>,
    routing_key: RoutingKey,
    payload: Value,
    predicate: ResultPredicate,
    ceiling: Duration,
    interval: Duration,
    cancel: CancellationToken,
}

impl<'a, T: BusTransport> RequestWait<'a, T> {
    pub(crate) fn new(
        correlator: &'a Correlator<T>,
        routing_key: RoutingKey,
        payload: Value,
        predicate: ResultPredicate,
        ceiling: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            correlator,
            routing_key,
            payload,
            predicate,
            ceiling,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Override the configured retry ceiling.
    pub fn within(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Override the configured re-send interval.
    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Tie this wait to a parent cancellation token.
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    async fn run(self) -> Result<CorrelationResult> {
        let deadline = Instant::now() + self.ceiling;
        let ctx = SendContext::default();

        loop {
            let result = self
                .correlator
                .send_request(&self.routing_key, self.payload.clone(), &ctx)
                .await;

            match (self.predicate.test)(&result) {
                Ok(true) => return Ok(result),
                Ok(false) => {}
                Err(err) => {
                    return Err(Error::predicate_failed(self.routing_key.clone(), err, None));
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::RequestWaitTimeout {
                    routing_key: self.routing_key.clone(),
                    predicate: self.predicate.describe().to_string(),
                    timeout: self.ceiling,
                });
            }

            let pause = self.interval.min(remaining);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::WaitCancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

impl<'a, T: BusTransport> IntoFuture for RequestWait<'a, T> {
    type Output = Result<CorrelationResult>;
    type IntoFuture =
        std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl<T> fmt::Debug for RequestWait<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestWait")
            .field("routing_key", &self.routing_key)
            .field("predicate", &self.predicate.describe())
            .field("ceiling", &self.ceiling)
            .finish_non_exhaustive()
    }
}
