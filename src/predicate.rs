//! Predicate capability for wait conditions.

use std::fmt;
use std::sync::Arc;

use crate::Message;

/// Error raised by a user-supplied predicate during evaluation.
pub type PredicateError = Box<dyn std::error::Error + Send + Sync>;

type TestFn = Arc<dyn Fn(&Message) -> Result<bool, PredicateError> + Send + Sync>;

/// A caller-supplied boolean test over a [`Message`].
///
/// The wait engine treats predicates as injected strategies and never
/// inspects their internals: it calls [`test`](Self::test) at most once per
/// buffered message per wait, and uses [`describe`](Self::describe) in
/// timeout diagnostics.
pub trait MessagePredicate: Send + Sync {
    /// Evaluate the predicate against one message.
    ///
    /// Returning `Err` fails the wait with a distinguished predicate error;
    /// it is never conflated with "no match yet".
    fn test(&self, message: &Message) -> Result<bool, PredicateError>;

    /// Human-readable form of the predicate, used in timeout and failure
    /// messages (e.g. `wait timeout for order.created with id == 42`).
    fn describe(&self) -> &str;
}

/// The standard predicate: a description paired with a closure.
///
/// Closures have no source text, so the description is supplied by the
/// caller and stands in for it in diagnostics.
///
/// # Example
///
/// ```ignore
/// // Infallible closure
/// let p = Predicate::new("id == 42", |m| m.body()["id"] == 42);
///
/// // Fallible closure
/// let p = Predicate::try_new("parse ts", |m| {
///     let ts = m.body()["ts"].as_str().ok_or("missing ts")?;
///     Ok(ts.starts_with("2026"))
/// });
/// ```
#[derive(Clone)]
pub struct Predicate {
    description: String,
    test: TestFn,
}

impl Predicate {
    /// Build a predicate from an infallible closure.
    pub fn new<F>(description: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            test: Arc::new(move |msg| Ok(test(msg))),
        }
    }

    /// Build a predicate from a fallible closure.
    pub fn try_new<F>(description: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Message) -> Result<bool, PredicateError> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            test: Arc::new(test),
        }
    }
}

impl MessagePredicate for Predicate {
    fn test(&self, message: &Message) -> Result<bool, PredicateError> {
        (self.test)(message)
    }

    fn describe(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// The outcome of evaluating a predicate against a single message.
///
/// A tagged result instead of an overloaded exception channel: a predicate
/// that fails is distinguished from one that has not matched yet, so the
/// wait loop can stop polling and surface the failure.
#[derive(Debug)]
pub enum PredicateOutcome {
    /// The predicate returned true.
    Match,
    /// The predicate returned false; keep polling.
    NoMatch,
    /// The predicate raised; stop polling and fail the wait.
    Failed(PredicateError),
}

impl PredicateOutcome {
    /// Evaluate `predicate` against `message`, mapping the mixed
    /// success/error channel into a tag.
    pub fn evaluate(predicate: &dyn MessagePredicate, message: &Message) -> Self {
        match predicate.test(message) {
            Ok(true) => PredicateOutcome::Match,
            Ok(false) => PredicateOutcome::NoMatch,
            Err(err) => PredicateOutcome::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(body: serde_json::Value) -> Message {
        Message::new("test.key".into(), body)
    }

    #[test]
    fn infallible_predicate_tags_match_and_no_match() {
        let p = Predicate::new("id == 42", |m| m.body()["id"] == 42);
        assert!(matches!(
            PredicateOutcome::evaluate(&p, &msg(json!({"id": 42}))),
            PredicateOutcome::Match
        ));
        assert!(matches!(
            PredicateOutcome::evaluate(&p, &msg(json!({"id": 1}))),
            PredicateOutcome::NoMatch
        ));
    }

    #[test]
    fn fallible_predicate_tags_failure() {
        let p = Predicate::try_new("requires ts", |m| {
            m.body()["ts"]
                .as_str()
                .map(|ts| ts.starts_with("2026"))
                .ok_or_else(|| "missing ts".into())
        });
        let outcome = PredicateOutcome::evaluate(&p, &msg(json!({})));
        match outcome {
            PredicateOutcome::Failed(err) => assert_eq!(err.to_string(), "missing ts"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn describe_carries_caller_text() {
        let p = Predicate::new("id == 42", |_| true);
        assert_eq!(p.describe(), "id == 42");
    }
}
