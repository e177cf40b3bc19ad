//! Error types for the `events` crate.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for event log operations.
/// Holds an error kind and an optional source for error chaining, following
/// the same root-struct + kind-enum pattern used across the platform's layers.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Kinds of errors that event log operations can produce.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// A consumer group with the same name already exists.
    /// Callers that tolerate re-registration swallow this kind.
    GroupExists,
    /// The named consumer group is not registered for the stream.
    GroupMissing,
    /// The payload could not be serialized or deserialized.
    Serialization,
    /// Any other failure reported by the log backend.
    Backend,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EventLog Error: {self:?}")
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Serialization,
        }
    }
}
