use crate::error::Error;
use crate::event::{DomainEvent, EventEnvelope};
use crate::event_log::{EntryId, EventLog};
use log::debug;
use std::sync::Arc;

/// Appends domain events to the event log on successful catalog writes.
///
/// The mutation path (controllers, the CSV import pipeline) holds one of
/// these and publishes after each committed change; every open streaming
/// session picks the entry up through its own consumer group.
#[derive(Clone)]
pub struct EventWriter {
    log: Arc<dyn EventLog>,
    stream_key: String,
}

impl EventWriter {
    pub fn new(log: Arc<dyn EventLog>, stream_key: impl Into<String>) -> Self {
        Self {
            log,
            stream_key: stream_key.into(),
        }
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    /// Serialize the event envelope and append it to the log.
    pub async fn publish(&self, event: &DomainEvent) -> Result<EntryId, Error> {
        let envelope = EventEnvelope::from(event);
        let payload = serde_json::to_string(&envelope)?;
        let entry_id = self.log.append(&self.stream_key, &payload).await?;

        debug!(
            "Published {} as entry {} on stream {}",
            event.event_name(),
            entry_id,
            self.stream_key
        );
        Ok(entry_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::StartPosition;
    use crate::MemoryEventLog;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn publish_appends_envelope() {
        let log = Arc::new(MemoryEventLog::new());
        log.create_consumer_group("catalog-events", "g1", StartPosition::Tail, true)
            .await
            .unwrap();

        let writer = EventWriter::new(log.clone(), "catalog-events");
        writer
            .publish(&DomainEvent::ProductUpdated {
                product: json!({"id": 42, "price": "19.99"}),
            })
            .await
            .unwrap();

        let batch = log
            .read_new("g1", "c1", "catalog-events", 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);

        let envelope: EventEnvelope = serde_json::from_str(&batch[0].payload).unwrap();
        assert_eq!(envelope.event, "product.updated");
        assert_eq!(envelope.data["id"], 42);
    }
}
