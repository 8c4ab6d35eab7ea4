//! # Busprobe
//!
//! End-to-end test support for message-bus-backed services.
//!
//! Busprobe lets a test suite send requests, commands, and events over a bus,
//! capture asynchronously delivered messages, and assert that an expected
//! message eventually arrives (or does not) despite network and processing
//! latency. The transport itself is an external collaborator behind the
//! [`BusTransport`] port; this crate owns the correlation and
//! eventual-assertion engine that turns "fire a message, then poll an
//! unpredictable stream of deliveries" into deterministic pass/fail outcomes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use busprobe::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result {
//!     let helper = BusHelper::new(
//!         Config::default().with_host("rabbit.test").enabled(true),
//!         transport, // any BusTransport implementation
//!     )?;
//!     let binder = LifecycleBinder::new(&helper);
//!     binder.begin_suite().await?;
//!
//!     helper.subscribe("order.created", ack_handler(), SubscribeOptions::default()).await?;
//!     helper.send_command("order.place", json!({"id": 42}), SendContext::default()).await;
//!
//!     let msg = helper
//!         .expect_message("order.created", Predicate::new("id == 42", |m| {
//!             m.body()["id"] == 42
//!         }))
//!         .await?;
//!     assert_eq!(msg.body()["id"], 42);
//!
//!     binder.end_suite().await
//! }
//! ```
//!
//! ## Core Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`BusHelper`] | Owning façade: sends, subscriptions, eventual assertions |
//! | [`BusTransport`] | Port trait the crate consumes; implement for your bus |
//! | [`RoutingKey`] | Opaque channel/topic identifier |
//! | [`Message`] | Immutable captured message (key, body, receive time) |
//! | [`CorrelationResult`] | Uniform status/body envelope for every send |
//! | [`Predicate`] | Described boolean test over a [`Message`] |
//! | [`LifecycleBinder`] | Test/suite boundary hooks (reset, connect, close) |
//! | [`Config`] | Host, timeouts, and poll intervals |
//!
//! ## Eventual Assertions
//!
//! Waiting is polling, not event-driven: delivery timing relative to the
//! assertion call is unknown, and a predicate may only become true after
//! several deliveries. Three guarantees hold for every wait:
//!
//! 1. Messages are observed in arrival order.
//! 2. A predicate is evaluated **at most once per message** per wait call.
//! 3. A predicate that returns an error fails the wait distinctly; it is
//!    never mistaken for "no match yet".
//!
//! Bus-level send failures never become Rust errors; they fold into a
//! [`CorrelationResult`] with `status >= 400`, so "expect an error response"
//! tests assert on `status` directly.
//!
//! ## Features
//!
//! - **`mock-transport`** - In-memory [`testing::MockTransport`] for testing
//!   against the helper without a bus.

mod buffer;
mod config;
mod correlation;
mod correlator;
mod error;
mod expectation;
mod helper;
mod lifecycle;
mod log_sink;
mod message;
mod predicate;
mod registry;
mod request_wait;
mod routing_key;
mod transport;

#[cfg(any(test, feature = "mock-transport"))]
pub mod testing;

pub use buffer::MessageBuffer;
pub use config::Config;
pub use correlation::{CorrelationResult, ErrorInfo, STATUS_DEFAULT_FAILURE, STATUS_OK};
pub use correlator::Correlator;
pub use error::Error;
pub use expectation::{MessageExpectation, NoMessageExpectation};
pub use helper::BusHelper;
pub use lifecycle::LifecycleBinder;
pub use log_sink::{LogRecord, LogSink, NullSink, TracingSink, crop_value};
pub use message::{DeliveryContext, Message};
pub use predicate::{MessagePredicate, Predicate, PredicateError, PredicateOutcome};
pub use registry::{
    HandlerFuture, MessageHandler, SubscribeOptions, SubscriptionRegistry, ack_handler,
    handler_fn,
};
pub use request_wait::{RequestWait, ResultPredicate};
pub use routing_key::RoutingKey;
pub use transport::{BusTransport, DeliveryHandler, SendContext, TransportFailure};

/// Convenience alias for `Result<T, busprobe::Error>`.
pub type Result<T = ()> = std::result::Result<T, Error>;
