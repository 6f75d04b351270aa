//! Request/response tracing hook.
//!
//! When tracing is on, every request, response status and raw response body
//! is handed to a [`TraceSink`]. The hook observes traffic only; it never
//! influences control flow.

use std::fmt;
use std::sync::Arc;

/// One traced item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// What is being traced, e.g. `Request:` or `Response Body:`.
    pub name: String,
    /// The traced value.
    pub value: String,
    /// `"{prefix}{name} {value}"`, ready to print.
    pub message: String,
}

/// Receives trace events.
pub trait TraceSink: Send + Sync {
    /// Handle one event.
    fn record(&self, event: &TraceEvent);
}

impl<F> TraceSink for F
where
    F: Fn(&TraceEvent) + Send + Sync,
{
    fn record(&self, event: &TraceEvent) {
        self(event)
    }
}

/// Sink that forwards events to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&self, event: &TraceEvent) {
        tracing::debug!(target: "sforce::trace", name = %event.name, "{}", event.message);
    }
}

/// An installed sink plus its prefix.
#[derive(Clone)]
pub(crate) struct Tracer {
    prefix: String,
    sink: Arc<dyn TraceSink>,
}

impl Tracer {
    pub(crate) fn new(prefix: &str, sink: Arc<dyn TraceSink>) -> Self {
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{} ", prefix)
        };
        Self { prefix, sink }
    }

    pub(crate) fn trace(&self, name: &str, value: impl fmt::Display) {
        let value = value.to_string();
        let message = format!("{}{} {}", self.prefix, name, value);
        self.sink.record(&TraceEvent {
            name: name.to_string(),
            value,
            message,
        });
    }
}
