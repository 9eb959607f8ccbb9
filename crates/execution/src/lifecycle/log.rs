//! Append-only event log with simple queries.

use super::{LifecycleEvent, LifecycleEventType};
use defi_agg_domain::Address;
use tracing::debug;

/// Events in emission order.
///
/// The log is part of the aggregator's state, so events of a failed request are discarded
/// together with the rest of that request's effects.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<LifecycleEvent>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn record(&mut self, event: LifecycleEvent) {
        debug!(
            id = %event.id,
            event_type = ?event.event_type,
            user = %event.user,
            "Event recorded"
        );
        self.events.push(event);
    }

    pub fn events(&self) -> &[LifecycleEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&LifecycleEvent> {
        self.events.last()
    }

    /// Gets all events attributed to `user`.
    pub fn by_user(&self, user: &Address) -> Vec<&LifecycleEvent> {
        self.events.iter().filter(|e| &e.user == user).collect()
    }

    /// Gets all events of one type.
    pub fn by_type(&self, event_type: LifecycleEventType) -> Vec<&LifecycleEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Gets all events emitted through one adapter.
    pub fn by_adapter(&self, adapter: &str) -> Vec<&LifecycleEvent> {
        self.events
            .iter()
            .filter(|e| e.adapter.as_deref() == Some(adapter))
            .collect()
    }

    /// Serializes the whole log as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events)
    }
}
