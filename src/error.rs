use std::sync::Arc;
use std::time::Duration;

use crate::{Message, RoutingKey, transport::TransportFailure};

/// The single error type for all busprobe operations.
///
/// Every fallible API returns `busprobe::Result<T>` (alias for
/// `Result<T, busprobe::Error>`). Bus-level send failures are deliberately
/// *not* represented here: the correlator folds them into a
/// [`CorrelationResult`](crate::CorrelationResult) so that test assertions
/// can inspect `status` uniformly. The variants below all fail the calling
/// test step.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The helper is enabled but no host was configured.
    #[error("bus helper requires a host to be set; check the helper configuration")]
    MissingHost,

    /// A wait was issued for a routing key with no prior subscription.
    #[error("subscribe to {0} before expecting something")]
    NotSubscribed(RoutingKey),

    /// The user-supplied predicate raised during evaluation.
    #[error("predicate for {routing_key} returned an error, but it should return a boolean")]
    PredicateFailed {
        routing_key: RoutingKey,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
        /// Most recently buffered message for the key, as diagnostic context.
        last_message: Option<Arc<Message>>,
    },

    /// No buffered message matched within the bound.
    #[error("timeout after {timeout:?} while expecting {routing_key} with {predicate}")]
    WaitTimeout {
        routing_key: RoutingKey,
        /// Human-readable form of the predicate that never matched.
        predicate: String,
        timeout: Duration,
        /// Most recently buffered message for the key, as diagnostic context.
        last_message: Option<Arc<Message>>,
    },

    /// A disallowed message appeared within a negative-assertion window.
    #[error("found unexpected message on {routing_key}: {message}")]
    UnexpectedMatch {
        routing_key: RoutingKey,
        message: Arc<Message>,
    },

    /// No request response satisfied the predicate within the retry ceiling.
    #[error("bus timeout after {timeout:?} waiting {routing_key} with {predicate}")]
    RequestWaitTimeout {
        routing_key: RoutingKey,
        predicate: String,
        timeout: Duration,
    },

    /// The parent cancellation token fired while a wait was in flight.
    #[error("wait cancelled")]
    WaitCancelled,

    /// Connection plumbing (`connect`/`close`/`subscribe`) failed.
    ///
    /// Send operations never produce this; their failures become
    /// `CorrelationResult`s with `status >= 400`.
    #[error("transport error: {0}")]
    Transport(#[from] TransportFailure),
}

impl Error {
    pub(crate) fn predicate_failed(
        routing_key: RoutingKey,
        source: crate::predicate::PredicateError,
        last_message: Option<Arc<Message>>,
    ) -> Self {
        Error::PredicateFailed {
            routing_key,
            source: Arc::from(source),
            last_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wait_timeout_names_key_and_predicate() {
        let err = Error::WaitTimeout {
            routing_key: "order.created".into(),
            predicate: "id == 42".into(),
            timeout: Duration::from_millis(500),
            last_message: None,
        };
        let text = err.to_string();
        assert!(text.contains("order.created"));
        assert!(text.contains("id == 42"));
    }

    #[test]
    fn unexpected_match_shows_message() {
        let msg = Arc::new(Message::new("audit.log".into(), json!({"who": "admin"})));
        let err = Error::UnexpectedMatch {
            routing_key: "audit.log".into(),
            message: msg,
        };
        assert!(err.to_string().contains("admin"));
    }

    #[test]
    fn not_subscribed_mentions_subscribing() {
        let err = Error::NotSubscribed("missing.key".into());
        assert!(err.to_string().contains("subscribe"));
        assert!(err.to_string().contains("missing.key"));
    }
}
