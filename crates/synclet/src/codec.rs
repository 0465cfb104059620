//! Serialization envelope shared by both sides of the bridge.
//!
//! Everything that crosses the bridge — request argument lists, plain
//! results, and the `{error, properties}` failure envelope — is encoded to
//! JSON bytes. The length prefix lives in the shared buffer's header word,
//! not in the byte stream itself, and the failure envelope is an ordinary
//! struct at the wire level; it gets no special treatment here.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HandlerError;

/// Error name marking a failure envelope synthesized by the share channel
/// when an outcome exceeds the transfer limit.
const OVERFLOW_ERROR_NAME: &str = "TransferOverflow";

const OVERFLOW_ALLOWED_KEY: &str = "allowedBytes";
const OVERFLOW_REQUIRED_KEY: &str = "requiredBytes";

pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(value)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<T> {
    serde_json::from_slice(bytes)
}

/// Wire shape of a failed outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FailureEnvelope {
    pub error: ErrorBody,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ErrorBody {
    pub name: String,
    pub message: String,
}

impl FailureEnvelope {
    pub fn from_handler(err: &HandlerError) -> Self {
        Self {
            error: ErrorBody {
                name: err.name().to_owned(),
                message: err.message().to_owned(),
            },
            properties: err.properties().clone(),
        }
    }

    pub fn into_handler(self) -> HandlerError {
        HandlerError::from_parts(self.error.name, self.error.message, self.properties)
    }

    /// Substitute envelope published in place of an outcome that cannot fit
    /// the shared buffer even after growth.
    pub fn overflow(allowed: usize, required: usize) -> Self {
        Self {
            error: ErrorBody {
                name: OVERFLOW_ERROR_NAME.to_owned(),
                message: format!(
                    "worker response is bigger than the allowed transfer size. \
                     the shared buffer can accept up to {allowed} bytes. \
                     the response needs {required} bytes"
                ),
            },
            properties: BTreeMap::from([
                (OVERFLOW_ALLOWED_KEY.to_owned(), Value::from(allowed as u64)),
                (
                    OVERFLOW_REQUIRED_KEY.to_owned(),
                    Value::from(required as u64),
                ),
            ]),
        }
    }

    /// Returns `(allowed, required)` when this is a synthesized overflow
    /// envelope.
    pub fn overflow_bytes(&self) -> Option<(usize, usize)> {
        if self.error.name != OVERFLOW_ERROR_NAME {
            return None;
        }
        let allowed = self.properties.get(OVERFLOW_ALLOWED_KEY)?.as_u64()?;
        let required = self.properties.get(OVERFLOW_REQUIRED_KEY)?.as_u64()?;
        Some((allowed as usize, required as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_values_round_trip() {
        let value = serde_json::json!({
            "nested": {"list": [1, 2, 3], "flag": true},
            "text": "some...thing",
        });
        let bytes = encode(&value).unwrap();
        let back: Value = decode(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn failure_envelope_is_a_plain_structured_value() {
        let err = HandlerError::new("This one goes kaboom!")
            .with_property("customField", "The answer is 42");
        let bytes = encode(&FailureEnvelope::from_handler(&err)).unwrap();

        // Decodable as a generic value, not just as the envelope type.
        let raw: Value = decode(&bytes).unwrap();
        assert_eq!(raw["error"]["message"], "This one goes kaboom!");
        assert_eq!(raw["properties"]["customField"], "The answer is 42");

        let envelope: FailureEnvelope = decode(&bytes).unwrap();
        assert_eq!(envelope.overflow_bytes(), None);
        let back = envelope.into_handler();
        assert_eq!(back, err);
    }

    #[test]
    fn overflow_envelope_carries_both_byte_counts() {
        let envelope = FailureEnvelope::overflow(1_048_576, 10_485_789);
        assert!(envelope.error.message.contains("1048576"));
        assert!(envelope.error.message.contains("10485789"));

        let bytes = encode(&envelope).unwrap();
        let back: FailureEnvelope = decode(&bytes).unwrap();
        assert_eq!(back.overflow_bytes(), Some((1_048_576, 10_485_789)));
    }
}
