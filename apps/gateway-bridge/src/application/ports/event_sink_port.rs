//! Event Sink Port (Driven Port)
//!
//! Where normalized events go. Publishing never fails from the caller's
//! point of view; a sink with nobody listening just drops the event.

use parking_lot::Mutex;

use crate::domain::events::GatewayEvent;

/// Port for delivering normalized events to the application.
pub trait EventSink: Send + Sync {
    /// Publish one event.
    fn publish(&self, event: GatewayEvent);
}

/// No-op event sink for testing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn publish(&self, _event: GatewayEvent) {}
}

/// Sink that keeps every event in memory, in publish order.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<GatewayEvent>>,
}

impl RecordingEventSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events published so far.
    #[must_use]
    pub fn events(&self) -> Vec<GatewayEvent> {
        self.events.lock().clone()
    }

    /// Remove and return all events published so far.
    pub fn drain(&self) -> Vec<GatewayEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of events of the given kind.
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: GatewayEvent) {
        self.events.lock().push(event);
    }
}
