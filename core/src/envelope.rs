//! The wire-level message unit.
//!
//! Every published payload is wrapped in an [`Envelope`] carrying a
//! producer-assigned identity and a publish timestamp. The envelope is
//! serialized as JSON (`{"id": .., "ts": .., "payload": {..}}`) so that
//! producers and consumers written in other languages can share a topic.

use crate::error::{BusError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-defined structured payload.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Identity, timestamp and payload of a published message.
///
/// The `id` is assigned once at publish time and is distinct from any
/// identifier the store assigns to the record holding the envelope. The bus
/// never mutates the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    id: String,
    #[serde(rename = "ts")]
    timestamp: i64,
    #[serde(default)]
    payload: Payload,
}

impl Envelope {
    /// Wrap a payload with a fresh UUID and the current time.
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp(),
            payload,
        }
    }

    /// Rebuild an envelope from already-assigned parts.
    #[must_use]
    pub fn from_parts(id: impl Into<String>, timestamp: i64, payload: Payload) -> Self {
        Self {
            id: id.into(),
            timestamp,
            payload,
        }
    }

    /// Producer-assigned identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Seconds since the Unix epoch at publish time.
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The wrapped payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consume the envelope, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Encode as the JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SerializationFailed`] if the payload cannot be encoded.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| BusError::SerializationFailed(e.to_string()))
    }

    /// Decode the JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SerializationFailed`] if `raw` is not a valid envelope.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| BusError::SerializationFailed(e.to_string()))
    }
}

/// A message returned by a read.
///
/// `id` is the identifier used for acknowledgment and dedupe: the
/// store-assigned record id for the log driver, the envelope id for the
/// queue driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Record identifier, if the driver exposes one.
    pub id: Option<String>,
    /// The decoded envelope.
    pub envelope: Envelope,
}

impl Message {
    /// The envelope's payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        self.envelope.payload()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn new_assigns_unique_ids() {
        let a = Envelope::new(Payload::new());
        let b = Envelope::new(Payload::new());
        assert_ne!(a.id(), b.id());
        assert!(Uuid::parse_str(a.id()).is_ok());
    }

    #[test]
    fn wire_form_uses_ts_field() {
        let envelope = Envelope::from_parts("abc", 1_700_000_000, payload(json!({"foo": "bar"})));
        let raw = envelope.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["id"], "abc");
        assert_eq!(value["ts"], 1_700_000_000);
        assert_eq!(value["payload"]["foo"], "bar");
    }

    #[test]
    fn decodes_foreign_producer_messages() {
        // Shape emitted by the Go and Node producers.
        let raw = r#"{"id":"1700000000000000000","ts":1700000000,"payload":{"type":"image.process","id":123}}"#;
        let envelope = Envelope::from_json(raw).unwrap();
        assert_eq!(envelope.id(), "1700000000000000000");
        assert_eq!(envelope.payload()["id"], 123);
    }

    #[test]
    fn missing_payload_defaults_to_empty() {
        let envelope = Envelope::from_json(r#"{"id":"x","ts":1}"#).unwrap();
        assert!(envelope.payload().is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Envelope::from_json("not json"),
            Err(BusError::SerializationFailed(_))
        ));
    }
}
