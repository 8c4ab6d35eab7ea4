use std::fmt;

use serde_json::Value;

use crate::transport::TransportFailure;

/// HTTP-style status code denoting success.
pub const STATUS_OK: u16 = 200;

/// Fallback status code for bus failures that carry no code of their own.
pub const STATUS_DEFAULT_FAILURE: u16 = 500;

/// The uniform outcome of every request/command/event send.
///
/// The correlator never returns `Err` for bus-level failures; it folds them
/// into a `CorrelationResult` with `status >= 400` so that "expect an error
/// response" tests can assert on `status` and `body` directly instead of
/// handling control-flow errors:
///
/// ```ignore
/// let result = helper.send_request("ping", json!({}), SendContext::default()).await;
/// assert_eq!(result.status(), 503);
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CorrelationResult {
    status: u16,
    body: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

impl CorrelationResult {
    /// A successful result wrapping the transport's response body.
    pub fn success(body: Value) -> Self {
        Self {
            status: STATUS_OK,
            body,
            error: None,
        }
    }

    /// The empty no-op result returned when the helper is disabled.
    pub fn empty() -> Self {
        Self::success(Value::Null)
    }

    /// Fold a bus-level failure into a result.
    ///
    /// The status is the failure's carried code parsed as an integer, or
    /// [`STATUS_DEFAULT_FAILURE`] when the failure carries none (or a
    /// non-numeric one). The failure's payload becomes the body and its
    /// code/message are kept in [`error_info`](Self::error_info).
    pub fn from_failure(failure: TransportFailure) -> Self {
        let status = failure
            .code
            .as_deref()
            .and_then(|c| c.parse::<u16>().ok())
            .unwrap_or(STATUS_DEFAULT_FAILURE);
        Self {
            status,
            body: failure.body,
            error: Some(ErrorInfo {
                code: failure.code,
                message: failure.message,
            }),
        }
    }

    /// The result status; 200 denotes success.
    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// True when the status denotes success (`< 400`).
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    /// The response (or failure) payload.
    #[inline]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Failure details, present only when the send failed at bus level.
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }
}

impl fmt::Display for CorrelationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationResult {{ status: {}, body: {} }}", self.status, self.body)
    }
}

/// Carried failure details merged into a [`CorrelationResult`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorInfo {
    /// The code string the bus reported, if any (e.g. `"503"`).
    pub code: Option<String>,
    /// Human-readable failure description.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_is_200() {
        let result = CorrelationResult::success(json!({"ok": true}));
        assert_eq!(result.status(), 200);
        assert!(result.is_success());
        assert!(result.error_info().is_none());
    }

    #[test]
    fn failure_takes_carried_code() {
        let failure = TransportFailure {
            code: Some("503".into()),
            body: json!({"reason": "unavailable"}),
            message: "service unavailable".into(),
        };
        let result = CorrelationResult::from_failure(failure);
        assert_eq!(result.status(), 503);
        assert!(!result.is_success());
        assert_eq!(result.body()["reason"], "unavailable");
        assert_eq!(result.error_info().unwrap().code.as_deref(), Some("503"));
    }

    #[test]
    fn failure_without_code_defaults_to_500() {
        let failure = TransportFailure {
            code: None,
            body: Value::Null,
            message: "boom".into(),
        };
        assert_eq!(CorrelationResult::from_failure(failure).status(), 500);
    }

    #[test]
    fn failure_with_non_numeric_code_defaults_to_500() {
        let failure = TransportFailure {
            code: Some("EHOSTDOWN".into()),
            body: Value::Null,
            message: "host down".into(),
        };
        let result = CorrelationResult::from_failure(failure);
        assert_eq!(result.status(), 500);
        assert_eq!(result.error_info().unwrap().code.as_deref(), Some("EHOSTDOWN"));
    }
}
