use std::{hash::Hash, sync::Arc};

/// Logical address under which messages are published and matched by subscribers.
///
/// A `RoutingKey` is an opaque string identifying a channel or topic on the
/// bus. It is unique per subscription; multiple sends may target the same key.
///
/// `RoutingKey` is cheap to clone and safe to hold across await points.
/// Equality uses string comparison with a fast-path for pointer equality
/// when keys share the same allocation.
///
/// # Example
///
/// ```ignore
/// helper.subscribe("order.created", handler, SubscribeOptions::default()).await?;
///
/// helper
///     .expect_message("order.created", Predicate::new("id == 42", |m| {
///         m.body()["id"] == 42
///     }))
///     .await?;
/// ```
#[derive(Debug, Clone, Ord, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct RoutingKey(Arc<str>);

impl RoutingKey {
    pub fn new(key: &str) -> Self {
        Self(Arc::from(key))
    }

    /// Returns the string representation of this routing key.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for RoutingKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for RoutingKey {}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Hash for RoutingKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl From<&str> for RoutingKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RoutingKey {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}
