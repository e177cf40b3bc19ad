//! The minimal event log surface the SSE distribution core consumes.
//!
//! The durable log itself is an external collaborator (a log-structured
//! pub/sub primitive with consumer-group offsets). This module models only
//! the operations the streamers need; [`crate::MemoryEventLog`] provides an
//! in-process implementation for development and tests.

use crate::error::Error;
use async_trait::async_trait;
use std::time::Duration;

/// Log-assigned identifier of one appended entry, opaque to consumers.
/// Ordered lexicographically-compatible within a stream by the backend.
pub type EntryId = String;

/// One entry read from a stream: the log-assigned id plus the payload as
/// appended (for domain events, a serialized [`crate::EventEnvelope`]).
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub id: EntryId,
    pub payload: String,
}

/// Where a newly created consumer group begins reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartPosition {
    /// Replay the stream from its first retained entry.
    Beginning,
    /// Only entries appended after group creation are visible.
    Tail,
}

/// An ordered, append-only, multi-consumer-group event log keyed by stream
/// name. Each consumer group tracks its own cursor; groups never observe
/// each other's progress.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append a payload to the stream, returning the log-assigned entry id.
    async fn append(&self, stream_key: &str, payload: &str) -> Result<EntryId, Error>;

    /// Create a consumer group on the stream at the given start position.
    ///
    /// When `must_not_exist` is true and the group is already registered,
    /// fails with [`crate::ErrorKind::GroupExists`]; callers that tolerate
    /// re-registration swallow that kind.
    async fn create_consumer_group(
        &self,
        stream_key: &str,
        group: &str,
        start: StartPosition,
        must_not_exist: bool,
    ) -> Result<(), Error>;

    /// Read entries the group has not yet delivered, advancing its cursor.
    ///
    /// Returns at most `max_count` entries in append order. When no new
    /// entries are available, blocks up to `block` before returning an empty
    /// batch. Delivered entries stay pending until acknowledged.
    async fn read_new(
        &self,
        group: &str,
        consumer: &str,
        stream_key: &str,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<LogEntry>, Error>;

    /// Acknowledge a delivered entry, removing it from the group's pending set.
    async fn acknowledge(&self, stream_key: &str, group: &str, entry_id: &str)
        -> Result<(), Error>;

    /// Remove a consumer group and its cursor. Removing a group that does not
    /// exist is not an error.
    async fn destroy_consumer_group(&self, stream_key: &str, group: &str) -> Result<(), Error>;

    /// Extend the group's time-to-live on backends that expire idle groups.
    /// Backends without group expiry keep the default no-op.
    async fn extend_group_ttl(
        &self,
        _stream_key: &str,
        _group: &str,
        _ttl: Duration,
    ) -> Result<(), Error> {
        Ok(())
    }
}
