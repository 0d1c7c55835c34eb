//! Analytics and error-tracking sinks.
//!
//! Both sinks are optional capabilities. A missing sink is [`NoopSink`], and
//! a failing sink never reaches the caller: [`forward_event`] and
//! [`forward_report`] log the failure and carry on.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::boundary::CapturedError;
use crate::error::SinkError;

/// A flat payload value: strings or numbers only.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum PayloadValue {
    Str(String),
    Num(f64),
}

impl PayloadValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::Str(s) => Some(s),
            PayloadValue::Num(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PayloadValue::Num(n) => Some(*n),
            PayloadValue::Str(_) => None,
        }
    }
}

/// Ordered key/value payload attached to an analytics event or context block.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Payload {
    fields: BTreeMap<String, PayloadValue>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a string value.
    pub fn with_str(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), PayloadValue::Str(value.into()));
        self
    }

    /// Insert a numeric value.
    pub fn with_num(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.insert(key.into(), PayloadValue::Num(value));
        self
    }

    /// Insert a boolean as the string `"true"` or `"false"`.
    pub fn with_bool(self, key: impl Into<String>, value: bool) -> Self {
        self.with_str(key, if value { "true" } else { "false" })
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.fields.get(key)
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PayloadValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Severity attached to an error report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    Warning,
    #[default]
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

/// Mutable scope handed to the error tracker alongside the exception.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scope {
    pub tags: BTreeMap<String, String>,
    pub contexts: BTreeMap<String, Payload>,
    pub level: Severity,
    /// Values the tracker groups identical failures by
    pub fingerprint: Vec<String>,
}

impl Scope {
    /// Set one tag.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Set one named context block.
    pub fn set_context(&mut self, name: impl Into<String>, payload: Payload) {
        self.contexts.insert(name.into(), payload);
    }
}

/// One captured exception plus its scope.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorReport {
    pub error: CapturedError,
    pub scope: Scope,
}

/// Event-forwarding analytics function.
pub trait AnalyticsSink {
    /// Forward one analytics event.
    fn track(&self, event: &str, payload: &Payload) -> Result<(), SinkError>;
}

/// Exception capture with scoped metadata.
pub trait ErrorTracker {
    /// Capture one error report.
    fn capture(&self, report: &ErrorReport) -> Result<(), SinkError>;
}

/// The absent sink.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl AnalyticsSink for NoopSink {
    fn track(&self, _event: &str, _payload: &Payload) -> Result<(), SinkError> {
        Ok(())
    }
}

impl ErrorTracker for NoopSink {
    fn capture(&self, _report: &ErrorReport) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A sink that keeps everything it receives in memory.
///
/// Useful for development hosts that want to inspect what would have been
/// sent, and as a test double.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: RefCell<Vec<(String, Payload)>>,
    reports: RefCell<Vec<ErrorReport>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events tracked so far.
    pub fn events(&self) -> Vec<(String, Payload)> {
        self.events.borrow().clone()
    }

    /// Reports captured so far.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.borrow().clone()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
        self.reports.borrow_mut().clear();
    }
}

impl AnalyticsSink for RecordingSink {
    fn track(&self, event: &str, payload: &Payload) -> Result<(), SinkError> {
        self.events.borrow_mut().push((event.to_string(), payload.clone()));
        Ok(())
    }
}

impl ErrorTracker for RecordingSink {
    fn capture(&self, report: &ErrorReport) -> Result<(), SinkError> {
        self.reports.borrow_mut().push(report.clone());
        Ok(())
    }
}

/// Forward an analytics event, swallowing failures and panics.
///
/// Returns `true` when the sink accepted the event.
pub fn forward_event(sink: &dyn AnalyticsSink, event: &str, payload: &Payload) -> bool {
    match catch_unwind(AssertUnwindSafe(|| sink.track(event, payload))) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::debug!(event, error = %err, "analytics sink rejected event");
            false
        }
        Err(_) => {
            tracing::debug!(event, "analytics sink panicked");
            false
        }
    }
}

/// Forward an error report, swallowing failures and panics.
///
/// Returns `true` when the tracker accepted the report.
pub fn forward_report(tracker: &dyn ErrorTracker, report: &ErrorReport) -> bool {
    match catch_unwind(AssertUnwindSafe(|| tracker.capture(report))) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::debug!(
                error = %err,
                original = %report.error,
                "error tracker rejected report"
            );
            false
        }
        Err(_) => {
            tracing::debug!(original = %report.error, "error tracker panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl AnalyticsSink for FailingSink {
        fn track(&self, _event: &str, _payload: &Payload) -> Result<(), SinkError> {
            Err(SinkError::failed("offline"))
        }
    }

    struct PanickingSink;

    impl ErrorTracker for PanickingSink {
        fn capture(&self, _report: &ErrorReport) -> Result<(), SinkError> {
            panic!("tracker exploded");
        }
    }

    #[test]
    fn test_payload_builder() {
        let payload = Payload::new()
            .with_str("animation_name", "hero")
            .with_num("fps", 58.0)
            .with_bool("reduced_motion", false);

        assert_eq!(payload.len(), 3);
        assert_eq!(payload.get("animation_name").and_then(|v| v.as_str()), Some("hero"));
        assert_eq!(payload.get("fps").and_then(|v| v.as_f64()), Some(58.0));
        assert_eq!(payload.get("reduced_motion").and_then(|v| v.as_str()), Some("false"));
    }

    #[test]
    fn test_forward_event_records() {
        let sink = RecordingSink::new();
        assert!(forward_event(&sink, "animation_performance", &Payload::new()));
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].0, "animation_performance");
    }

    #[test]
    fn test_forward_event_swallows_errors() {
        assert!(!forward_event(&FailingSink, "x", &Payload::new()));
    }

    #[test]
    fn test_forward_report_swallows_panics() {
        let report = ErrorReport {
            error: CapturedError::new("TypeError", "boom"),
            scope: Scope::default(),
        };
        assert!(!forward_report(&PanickingSink, &report));
    }
}
