//! The `{ service, data }` envelope every message body carries.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{CodecError, codec};

/// Application-level message: a service tag plus a map of fields.
///
/// `data` always contains `timestamp` (wall-clock milliseconds, advisory) and
/// `clock` (the sender's logical clock at send time) once the envelope has
/// been stamped. Peers that omit either are read as 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Handler selector
    pub service: String,
    /// Service-specific fields
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Causality stamp embedded in every envelope's `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stamp {
    /// Wall-clock milliseconds since the Unix epoch (advisory only)
    #[serde(default)]
    pub timestamp: u64,
    /// Sender's logical clock at send time
    #[serde(default)]
    pub clock: u64,
}

/// Result marker carried by error replies.
///
/// The wire spelling follows the deployed clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Request handled
    #[serde(rename = "sucesso")]
    Success,
    /// Request rejected; `description` says why
    #[serde(rename = "erro")]
    Error,
}

impl Status {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "sucesso",
            Self::Error => "erro",
        }
    }
}

impl Envelope {
    /// Build an envelope from raw fields.
    pub fn new(service: impl Into<String>, data: Map<String, Value>) -> Self {
        Self { service: service.into(), data }
    }

    /// Build an envelope from a typed payload.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NotAMap` if the payload does not serialize to a
    /// map.
    pub fn from_payload<T: Serialize>(
        service: impl Into<String>,
        payload: &T,
    ) -> Result<Self, CodecError> {
        let service = service.into();
        match serde_json::to_value(payload) {
            Ok(Value::Object(data)) => Ok(Self { service, data }),
            Ok(_) => Err(CodecError::NotAMap(service)),
            Err(e) => Err(CodecError::Encode(e.to_string())),
        }
    }

    /// Read `data` as a typed payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.data.clone()))
    }

    /// Sender's logical clock, or 0 if absent or not an unsigned integer.
    pub fn clock(&self) -> u64 {
        self.data.get("clock").and_then(Value::as_u64).unwrap_or(0)
    }

    /// Sender's wall-clock timestamp, or 0 if absent.
    pub fn timestamp(&self) -> u64 {
        self.data.get("timestamp").and_then(Value::as_u64).unwrap_or(0)
    }

    /// Both stamp fields.
    pub fn stamp(&self) -> Stamp {
        Stamp { timestamp: self.timestamp(), clock: self.clock() }
    }

    /// Overwrite the stamp fields, leaving every other field untouched.
    pub fn set_stamp(&mut self, stamp: Stamp) {
        self.data.insert("timestamp".to_string(), Value::from(stamp.timestamp));
        self.data.insert("clock".to_string(), Value::from(stamp.clock));
    }

    /// `status` field of the reply, if present.
    pub fn status(&self) -> Option<Status> {
        self.data.get("status").and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// True if this envelope reports a failure.
    pub fn is_error(&self) -> bool {
        self.status() == Some(Status::Error)
    }

    /// Human-readable failure description, if any.
    pub fn description(&self) -> Option<&str> {
        self.data.get("description").and_then(Value::as_str)
    }

    /// Encode as CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    /// Decode from CBOR, falling back to JSON.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        codec::decode(bytes)
    }
}
