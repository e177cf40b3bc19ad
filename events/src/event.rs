use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Domain events that represent catalog-level changes in the system.
/// These events are emitted when catalog operations complete successfully.
///
/// Product data is carried as `serde_json::Value` to avoid dependencies on
/// the persistence layer; the SSE subsystem forwards it opaquely.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// Emitted when a new product is created.
    ProductCreated { product: Value },
    /// Emitted when an existing product is modified.
    ProductUpdated { product: Value },
    /// Emitted when a product is soft-deleted.
    ProductDeleted { product: Value },
    /// Emitted when a soft-deleted product is restored.
    ProductRestored { product: Value },
    /// Emitted once per product brought in through a bulk import.
    ProductImported { product: Value },
}

impl DomainEvent {
    /// The SSE event name this domain event is published under.
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEvent::ProductCreated { .. } => "product.created",
            DomainEvent::ProductUpdated { .. } => "product.updated",
            DomainEvent::ProductDeleted { .. } => "product.deleted",
            DomainEvent::ProductRestored { .. } => "product.restored",
            DomainEvent::ProductImported { .. } => "product.imported",
        }
    }

    /// The event payload as it appears on the wire in the `data:` line.
    pub fn payload(&self) -> &Value {
        match self {
            DomainEvent::ProductCreated { product }
            | DomainEvent::ProductUpdated { product }
            | DomainEvent::ProductDeleted { product }
            | DomainEvent::ProductRestored { product }
            | DomainEvent::ProductImported { product } => product,
        }
    }
}

/// The JSON envelope stored as an event log entry's payload.
///
/// Stored form: `{"event": "product.updated", "data": {...}}`. Consumers
/// recover the SSE event name and data payload from it without needing the
/// `DomainEvent` type itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    pub data: Value,
}

impl From<&DomainEvent> for EventEnvelope {
    fn from(event: &DomainEvent) -> Self {
        EventEnvelope {
            event: event.event_name().to_string(),
            data: event.payload().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_names_match_wire_protocol() {
        let product = json!({"id": 42});
        assert_eq!(
            DomainEvent::ProductCreated {
                product: product.clone()
            }
            .event_name(),
            "product.created"
        );
        assert_eq!(
            DomainEvent::ProductRestored {
                product: product.clone()
            }
            .event_name(),
            "product.restored"
        );
        assert_eq!(
            DomainEvent::ProductImported { product }.event_name(),
            "product.imported"
        );
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let event = DomainEvent::ProductUpdated {
            product: json!({"id": 42, "price": "19.99"}),
        };

        let envelope = EventEnvelope::from(&event);
        let serialized = serde_json::to_string(&envelope).unwrap();
        let parsed: EventEnvelope = serde_json::from_str(&serialized).unwrap();

        assert_eq!(parsed.event, "product.updated");
        assert_eq!(parsed.data["price"], "19.99");
    }
}
