//! Wire envelope
//!
//! Every frame on the wire, in both directions, is a JSON object
//! `{"event": "<name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Event name the server uses to reject a session
pub const CONNECT_ERROR: &str = "connect_error";

/// Event name the server uses to report a non-fatal socket error
pub const ERROR: &str = "error";

/// A single named frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name
    pub event: String,

    /// Event payload (opaque to the client)
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::ProtocolMalformed {
            message: e.to_string(),
        })
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::ProtocolMalformed {
            message: e.to_string(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────
// Server Errors
// ─────────────────────────────────────────────────────────────────

/// Classification the server attaches to its error frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerErrorKind {
    /// The credential was missing, invalid or expired
    Auth,
    /// Anything else
    #[default]
    #[serde(other)]
    Other,
}

/// Payload of `connect_error` and `error` frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub kind: ServerErrorKind,

    #[serde(default)]
    pub message: String,
}

impl ServerError {
    /// Decode from an envelope payload. A bare string payload is taken as
    /// the message of an unclassified error.
    pub fn from_data(data: &Value) -> Self {
        match data {
            Value::String(message) => Self {
                kind: ServerErrorKind::Other,
                message: message.clone(),
            },
            other => serde_json::from_value(other.clone()).unwrap_or_else(|_| Self {
                kind: ServerErrorKind::Other,
                message: other.to_string(),
            }),
        }
    }

    pub fn into_error(self) -> Error {
        match self.kind {
            ServerErrorKind::Auth => Error::AuthenticationFailed {
                message: self.message,
            },
            ServerErrorKind::Other => Error::Protocol(self.message),
        }
    }
}
