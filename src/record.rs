//! The persisted record shape: `{"value": <payload>, "expiry": <seconds>}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::expiry::Timestamp;

/// One stored entry.  Field order is `value`, then `expiry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<V> {
    pub value: V,
    pub expiry: Timestamp,
}

impl<V: Serialize> Record<V> {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<V: DeserializeOwned> Record<V> {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// The value-agnostic view of a record, used where only the deadline matters.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[allow(dead_code)]
    pub(crate) value: serde::de::IgnoredAny,
    pub(crate) expiry: Timestamp,
}

impl Envelope {
    pub(crate) fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
