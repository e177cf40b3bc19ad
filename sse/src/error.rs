//! Error types for the `sse` crate.
//!
//! Follows the same pattern as the other platform layers: a root Error
//! struct holding an error kind and an optional source.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the SSE subsystem.
///
/// Only the proxy's upstream leg produces these; everything that threatens
/// the client-facing socket is handled through session termination reasons,
/// and log housekeeping failures are logged where they occur.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Kinds of errors the SSE subsystem can produce.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The upstream request could not be sent or its connection failed.
    UpstreamConnect,
    /// The upstream endpoint answered with a non-success status.
    UpstreamStatus(u16),
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
        write!(f, "SSE Error: {self:?}")
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = match err.status() {
            Some(status) => ErrorKind::UpstreamStatus(status.as_u16()),
            None => ErrorKind::UpstreamConnect,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}
