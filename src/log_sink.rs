//! Structured log records exposed to the reporting collaborator.
//!
//! The core never formats or persists reports; it emits [`LogRecord`]s at
//! well-defined points (request sent, command sent, message received, wait
//! resolved, wait failed) and hands them to whichever [`LogSink`] the helper
//! was built with. [`TracingSink`] forwards records to the `tracing` crate;
//! test reporters can install their own sink to attach records to test
//! output.

use std::fmt;

use serde_json::Value;

/// Maximum string length before [`crop_value`] truncates.
const MAX_STRING_LEN: usize = 512;

/// Maximum array length before [`crop_value`] truncates.
const MAX_ARRAY_LEN: usize = 32;

/// A structured "log this" event.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LogRecord {
    /// Short human-readable title, e.g. `"Send bus request"`.
    pub title: String,
    /// Arbitrary structured payload, cropped before emission.
    pub value: Value,
}

impl LogRecord {
    /// Build a record, cropping oversized payloads.
    pub fn new(title: impl Into<String>, value: Value) -> Self {
        Self {
            title: title.into(),
            value: crop_value(value),
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.value)
    }
}

/// Destination for structured log records.
///
/// Implementations must not block; emission happens on delivery and wait
/// paths.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: LogRecord);
}

/// The default sink: forwards records to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: LogRecord) {
        tracing::debug!(title = %record.title, value = %record.value, "bus helper log");
    }
}

/// A sink that drops all records; installed when the helper is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn emit(&self, _record: LogRecord) {}
}

/// Truncate long strings and arrays so log records stay readable.
///
/// Strings are cut to [`MAX_STRING_LEN`] characters with an ellipsis marker;
/// arrays are cut to [`MAX_ARRAY_LEN`] elements. Objects and nested values
/// are cropped recursively.
pub fn crop_value(value: Value) -> Value {
    match value {
        Value::String(s) => {
            if s.chars().count() > MAX_STRING_LEN {
                let cropped: String = s.chars().take(MAX_STRING_LEN).collect();
                Value::String(format!("{cropped}…"))
            } else {
                Value::String(s)
            }
        }
        Value::Array(items) => {
            let truncated = items.len() > MAX_ARRAY_LEN;
            let mut cropped: Vec<Value> =
                items.into_iter().take(MAX_ARRAY_LEN).map(crop_value).collect();
            if truncated {
                cropped.push(Value::String("…".into()));
            }
            Value::Array(cropped)
        }
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, crop_value(v))).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_values_pass_through_unchanged() {
        let value = json!({"id": 42, "name": "short"});
        assert_eq!(crop_value(value.clone()), value);
    }

    #[test]
    fn long_strings_are_truncated() {
        let long = "x".repeat(2000);
        let cropped = crop_value(json!(long));
        let s = cropped.as_str().unwrap();
        assert!(s.chars().count() <= MAX_STRING_LEN + 1);
        assert!(s.ends_with('…'));
    }

    #[test]
    fn long_arrays_are_truncated_with_marker() {
        let items: Vec<u32> = (0..100).collect();
        let cropped = crop_value(json!(items));
        let arr = cropped.as_array().unwrap();
        assert_eq!(arr.len(), MAX_ARRAY_LEN + 1);
        assert_eq!(arr.last().unwrap(), "…");
    }

    #[test]
    fn nested_objects_are_cropped_recursively() {
        let long = "y".repeat(1000);
        let cropped = crop_value(json!({"outer": {"inner": long}}));
        let s = cropped["outer"]["inner"].as_str().unwrap();
        assert!(s.chars().count() <= MAX_STRING_LEN + 1);
    }

    #[test]
    fn record_display_pairs_title_and_value() {
        let record = LogRecord::new("Send bus request", json!({"routingKey": "ping"}));
        let text = record.to_string();
        assert!(text.starts_with("Send bus request: "));
        assert!(text.contains("ping"));
    }
}
