//! Error types for both sides of the bridge.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// An error raised by a worker handler, carried across the bridge with its
/// extra fields intact.
///
/// The wire envelope only transports plain structured data, so anything the
/// caller should see beyond the message has to be captured into the flat
/// property map before publication. [`HandlerError::capture`] does this for
/// serializable error types; handlers can also build one field by field.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerError {
    name: String,
    message: String,
    properties: BTreeMap<String, Value>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_owned(),
            message: message.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach an extension field. Values that cannot be serialized are stored
    /// as `null` rather than dropped, so the key still round-trips.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.properties.insert(key.into(), value);
        self
    }

    /// Build a bridged error from an arbitrary error value: the message comes
    /// from its `Display` impl and every field of its serialized form becomes
    /// an extension property.
    pub fn capture<E>(err: &E) -> Self
    where
        E: fmt::Display + Serialize,
    {
        let mut captured = Self::new(err.to_string());
        if let Ok(Value::Object(fields)) = serde_json::to_value(err) {
            captured.properties.extend(fields);
        }
        captured
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub(crate) fn from_parts(
        name: String,
        message: String,
        properties: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            name,
            message,
            properties,
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

/// Errors surfaced at the synchronous call site.
#[derive(Debug, Error)]
pub enum CallError {
    /// The handler failed; reconstructed with its captured fields.
    #[error(transparent)]
    Handler(HandlerError),

    /// The wait exceeded the configured timeout. The worker and its buffer
    /// have been replaced; the next call runs on a fresh generation.
    #[error("Timed out running async function")]
    Timeout,

    /// The encoded outcome did not fit even after growth. The generation is
    /// reused unchanged for subsequent calls.
    #[error("worker response is bigger than the allowed transfer size. the shared buffer can accept up to {allowed} bytes. the response needs {required} bytes")]
    TransferOverflow { allowed: usize, required: usize },

    #[error("failed to encode request arguments: {0}")]
    EncodeRequest(#[source] serde_json::Error),

    #[error("failed to decode worker response: {0}")]
    DecodeResponse(#[source] serde_json::Error),
}

/// Errors from [`run_as_worker`](crate::run_as_worker) itself. Handler
/// failures are not reported here; they travel back to the caller.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cannot connect to the bridge, are you running this inside a worker entry point?")]
    NotAWorker,

    #[error("failed to start the worker runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
