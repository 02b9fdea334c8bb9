//! Unified error type for the rate monitor.
//!
//! `MonitorError` is the single error type returned by every fallible monitor
//! operation. It serializes as `{ "kind": "...", "message": "..." }` so an
//! external control endpoint can distinguish error categories.

use std::collections::TryReserveError;

use serde::ser::SerializeStruct;

/// Monitor-level error.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// A Node or Counter could not be allocated. No state was modified.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Rejected configuration (bad mode string, unparsable document, ...).
    #[error("{0}")]
    InvalidConfig(String),

    /// Invalid argument passed to a command.
    #[error("{0}")]
    InvalidInput(String),
}

impl MonitorError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::OutOfMemory(_) => "OutOfMemory",
            MonitorError::InvalidConfig(_) => "InvalidConfig",
            MonitorError::InvalidInput(_) => "InvalidInput",
        }
    }
}

/// Produces `{ "kind": "Variant", "message": "..." }`.
impl serde::Serialize for MonitorError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("MonitorError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

// ---- From implementations for ergonomic error conversion ----

impl From<TryReserveError> for MonitorError {
    fn from(err: TryReserveError) -> Self {
        MonitorError::OutOfMemory(err.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
