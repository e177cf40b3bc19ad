//! Event system infrastructure for the catalog sync platform.
//!
//! This crate provides the event system that enables loose coupling between
//! catalog mutations and the SSE distribution layer.
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all catalog change events
//! - **EventLog**: Trait modeling the ordered, multi-consumer-group event log
//!   (append, read-new-since-cursor, acknowledge)
//! - **MemoryEventLog**: In-process `EventLog` implementation used in
//!   development and tests
//! - **EventWriter**: Appends domain events to the log on successful writes
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies. Product data is carried as serialized JSON values.

mod event;
mod memory;
mod writer;

pub mod error;
pub mod event_log;

pub use error::{Error, ErrorKind};
pub use event::{DomainEvent, EventEnvelope};
pub use event_log::{EntryId, EventLog, LogEntry, StartPosition};
pub use memory::MemoryEventLog;
pub use writer::EventWriter;

/// A type alias that represents any entity's internal id field data type.
pub type Id = uuid::Uuid;
