use std::time::Duration;

use crate::{Error, Result};

/// Runtime configuration for the bus helper.
///
/// Controls connection parameters and wait timing. Use the builder pattern
/// to customize, or [`Default`] for sensible defaults. A disabled helper
/// (the default) turns every operation into a no-op, which lets suites run
/// without a bus available.
///
/// # Examples
///
/// ```rust
/// use busprobe::Config;
///
/// let config = Config::default()
///     .with_host("rabbit.test.internal")
///     .enabled(true)
///     .with_default_timeout(std::time::Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// Bus hostname. Required when the helper is enabled.
    pub host: Option<String>,

    /// Bus port.
    /// Default: 5672
    pub port: u16,

    /// Exchange the transport binds to.
    /// Default: "common"
    pub exchange: String,

    /// Per-subscription prefetch count passed to the transport.
    /// Default: 100
    pub prefetch_count: u16,

    /// Whether the helper is active. When false, sends resolve with empty
    /// results and lifecycle hooks are no-ops.
    /// Default: false
    pub enabled: bool,

    /// Default bound for message waits.
    /// Default: 5s
    pub default_timeout: Duration,

    /// Poll interval for confirmation waits (`expect_message`).
    /// Default: 100ms
    pub confirm_poll_interval: Duration,

    /// Poll (re-send) interval for retry-driven request waits.
    /// Default: 250ms
    pub request_poll_interval: Duration,

    /// Total ceiling for retry-driven request waits.
    /// Default: 2s
    pub request_wait_ceiling: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: None,
            port: 5672,
            exchange: "common".into(),
            prefetch_count: 100,
            enabled: false,
            default_timeout: Duration::from_millis(5000),
            confirm_poll_interval: Duration::from_millis(100),
            request_poll_interval: Duration::from_millis(250),
            request_wait_ceiling: Duration::from_millis(2000),
        }
    }
}

impl Config {
    /// Set the bus hostname.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the bus port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the exchange name.
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// Set the per-subscription prefetch count.
    pub fn with_prefetch_count(mut self, count: u16) -> Self {
        self.prefetch_count = count;
        self
    }

    /// Enable or disable the helper.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the default bound for message waits.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the poll interval for confirmation waits.
    pub fn with_confirm_poll_interval(mut self, interval: Duration) -> Self {
        self.confirm_poll_interval = interval;
        self
    }

    /// Set the re-send interval for retry-driven request waits.
    pub fn with_request_poll_interval(mut self, interval: Duration) -> Self {
        self.request_poll_interval = interval;
        self
    }

    /// Set the total ceiling for retry-driven request waits.
    pub fn with_request_wait_ceiling(mut self, ceiling: Duration) -> Self {
        self.request_wait_ceiling = ceiling;
        self
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHost`] when the helper is enabled without a
    /// host. A disabled helper is always valid.
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.host.is_none() {
            return Err(Error::MissingHost);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_validates_without_host() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn enabled_config_requires_host() {
        let err = Config::default().enabled(true).validate().unwrap_err();
        assert!(matches!(err, Error::MissingHost));

        let ok = Config::default().enabled(true).with_host("localhost").validate();
        assert!(ok.is_ok());
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = Config::default()
            .with_host("rabbit")
            .with_port(5671)
            .with_exchange("orders")
            .with_default_timeout(Duration::from_secs(10));
        assert_eq!(config.host.as_deref(), Some("rabbit"));
        assert_eq!(config.port, 5671);
        assert_eq!(config.exchange, "orders");
        assert_eq!(config.default_timeout, Duration::from_secs(10));
    }
}
