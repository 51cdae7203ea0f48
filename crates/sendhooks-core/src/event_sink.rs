//! Operator-facing event log.
//!
//! The pipeline reports errors, warnings and notable events through an
//! [`EventSink`]. Recording is fire-and-forget: a sink must never fail or
//! block the caller.

use std::fmt;
use std::sync::Mutex;

/// Severity of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventLevel {
    Error,
    Warning,
    Event,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventLevel::Error => "ERROR",
            EventLevel::Warning => "WARNING",
            EventLevel::Event => "EVENT",
        };
        f.write_str(s)
    }
}

/// A sink that receives pipeline events.
pub trait EventSink: Send + Sync {
    fn record(&self, level: EventLevel, message: &str);
}

/// Forwards events to `tracing` under the `sendhooks::events` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, level: EventLevel, message: &str) {
        match level {
            EventLevel::Error => tracing::error!(target: "sendhooks::events", "{}", message),
            EventLevel::Warning => tracing::warn!(target: "sendhooks::events", "{}", message),
            EventLevel::Event => tracing::info!(target: "sendhooks::events", "{}", message),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn record(&self, _level: EventLevel, _message: &str) {}
}

/// Keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(EventLevel, String)>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events in order.
    pub fn events(&self) -> Vec<(EventLevel, String)> {
        self.lock().clone()
    }

    /// Messages recorded at `level`.
    pub fn messages(&self, level: EventLevel) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn count(&self, level: EventLevel) -> usize {
        self.lock().iter().filter(|(l, _)| *l == level).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(EventLevel, String)>> {
        // A poisoned lock still holds valid data for a log buffer.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for RecordingEventSink {
    fn record(&self, level: EventLevel, message: &str) {
        self.lock().push((level, message.to_string()));
    }
}
