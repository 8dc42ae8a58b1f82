use std::sync::Mutex;

use tracing::info;

/// Category of a pushed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Analyzer state or progress changed.
    Status,
    /// Analyzer configuration changed.
    Config,
    /// User-facing notice (e.g. a skipped frame).
    Notice,
}

/// One pushed event, as buffered by [`MemoryEventSink`].
#[derive(Clone, Debug)]
pub struct Event {
    /// Event category.
    pub category: EventCategory,
    /// Id of the analyzer the event concerns.
    pub analyzer_id: String,
    /// Structured payload.
    pub payload: serde_json::Value,
}

/// Event sink collaborator: synchronous, fire-and-forget delivery of
/// engine events to an outer layer (SSE stream, UI bus, log).
pub trait EventSink: Send + Sync {
    /// Push one event. Must not block on slow consumers.
    fn push(&self, category: EventCategory, analyzer_id: &str, payload: serde_json::Value);
}

/// Sink that logs every event through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn push(&self, category: EventCategory, analyzer_id: &str, payload: serde_json::Value) {
        info!(?category, analyzer_id, %payload, "event");
    }
}

/// Sink buffering events in memory; used by tests and polling consumers.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<Event>>,
}

impl MemoryEventSink {
    /// Construct an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events pushed so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for MemoryEventSink {
    fn push(&self, category: EventCategory, analyzer_id: &str, payload: serde_json::Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(Event {
                category,
                analyzer_id: analyzer_id.to_string(),
                payload,
            });
        }
    }
}
