//! Enrichment lifecycle events.
//!
//! The [`EventBus`] is a `tokio::sync::broadcast` channel carrying
//! [`EnrichmentEvent`] values. Front ends subscribe to learn when a request
//! settles instead of polling. With no subscribers, events are dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::FailureKind;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Every transition the tracker makes, plus suppressed duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EnrichmentEvent {
    /// A request cycle began; the entity is now in flight.
    Started { key: String, request_id: Uuid },
    /// A request was ignored because one is already in flight for the key.
    Suppressed { key: String },
    /// The cycle ended with generated text.
    Succeeded {
        key: String,
        request_id: Uuid,
        chars: usize,
        elapsed_ms: u64,
    },
    /// The cycle ended in failure.
    Failed {
        key: String,
        request_id: Uuid,
        kind: FailureKind,
        elapsed_ms: u64,
    },
}

impl EnrichmentEvent {
    pub fn key(&self) -> &str {
        match self {
            EnrichmentEvent::Started { key, .. }
            | EnrichmentEvent::Suppressed { key }
            | EnrichmentEvent::Succeeded { key, .. }
            | EnrichmentEvent::Failed { key, .. } => key,
        }
    }

    /// Whether this event ends a request cycle.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            EnrichmentEvent::Succeeded { .. } | EnrichmentEvent::Failed { .. }
        )
    }
}

/// Broadcast channel for [`EnrichmentEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EnrichmentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: EnrichmentEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnrichmentEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = EnrichmentEvent::Failed {
            key: "notes".to_string(),
            request_id: Uuid::nil(),
            kind: FailureKind::Malformed,
            elapsed_ms: 12,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Failed");
        assert_eq!(json["key"], "notes");
        assert_eq!(json["kind"], "malformed");

        let parsed: EnrichmentEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        bus.emit(EnrichmentEvent::Suppressed {
            key: "a".to_string(),
        });
    }

    #[test]
    fn test_subscribe_receive() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        bus.emit(EnrichmentEvent::Started {
            key: "a".to_string(),
            request_id: Uuid::nil(),
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.key(), "a");
        assert!(!event.is_settled());
    }
}
