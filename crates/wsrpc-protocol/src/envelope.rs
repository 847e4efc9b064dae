//! The wire envelope shared by calls, results and notifications.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Argument or result value carried by an envelope.
///
/// Any JSON value: null, bool, number, string, array or object.
pub type Payload = serde_json::Value;

/// Correlation id. `0` is reserved for notifications.
pub type CallId = u64;

/// Kind of envelope, serialized as the `typ` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    /// Server → browser request that expects exactly one result.
    Call,
    /// Browser → server answer to a call, matched by `id`.
    Result,
    /// Server → browser one-way message.
    Notify,
}

impl EnvelopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Result => "result",
            Self::Notify => "notify",
        }
    }
}

impl std::fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One RPC message on the wire.
///
/// `{"typ": "call"|"result"|"notify", "id": <u64>, "action": <string>, "data": <any>}`
///
/// The browser omits `action` on results, so every field but `typ` is
/// optional when decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub typ: EnvelopeType,
    #[serde(default)]
    pub id: CallId,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub data: Payload,
}

impl Envelope {
    pub fn call(id: CallId, action: impl Into<String>, data: Payload) -> Self {
        Self {
            typ: EnvelopeType::Call,
            id,
            action: action.into(),
            data,
        }
    }

    pub fn result(id: CallId, data: Payload) -> Self {
        Self {
            typ: EnvelopeType::Result,
            id,
            action: String::new(),
            data,
        }
    }

    /// Notifications never carry a correlation id.
    pub fn notify(action: impl Into<String>, data: Payload) -> Self {
        Self {
            typ: EnvelopeType::Notify,
            id: 0,
            action: action.into(),
            data,
        }
    }

    pub fn is_result(&self) -> bool {
        self.typ == EnvelopeType::Result
    }

    /// Serialize to the JSON text sent in a WebSocket text frame.
    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encode)
    }

    /// Parse a received frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::MalformedEnvelope)
    }
}
