//! Real-time channel frames (JSON text).
//!
//! Client -> server: `{"event":"message","data":<any>,"ack":<u64>?}`.
//! The `data` field is kept as `RawValue` so the unit-of-work hook decides
//! whether (and how) to parse it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::{FleetError, Result};

/// The only application event accepted on the channel.
pub const EVENT_MESSAGE: &str = "message";

/// Inbound text frame.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientFrame {
    /// Event name (currently only `message`).
    pub event: String,
    /// Arbitrary payload, stored as raw JSON (lazy parsing).
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
    /// Optional acknowledgement id; echoed back in an `ack` frame.
    #[serde(default)]
    pub ack: Option<u64>,
}

/// Decode a text frame into a [`ClientFrame`].
pub fn decode_client_frame(s: &str) -> Result<ClientFrame> {
    serde_json::from_str(s).map_err(|e| FleetError::BadRequest(format!("invalid frame json: {e}")))
}

/// Payload handed to the unit-of-work hook.
#[derive(Debug)]
pub enum MessagePayload {
    Json(Box<RawValue>),
    Binary(Bytes),
    Empty,
}

impl MessagePayload {
    pub fn len(&self) -> usize {
        match self {
            MessagePayload::Json(raw) => raw.get().len(),
            MessagePayload::Binary(b) => b.len(),
            MessagePayload::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Option<Box<RawValue>>> for MessagePayload {
    fn from(raw: Option<Box<RawValue>>) -> Self {
        raw.map(MessagePayload::Json).unwrap_or(MessagePayload::Empty)
    }
}

/// Outbound text frame.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerFrame<'a> {
    /// Sent once after the session opens.
    Connected { sid: &'a str, pid: u32 },
    /// Completion of a message that carried an ack id.
    Ack {
        ack: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// Frame rejected; the session stays open.
    Error { code: &'a str, msg: &'a str },
}

impl ServerFrame<'_> {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| FleetError::Internal(format!("frame encode failed: {e}")))
    }
}
