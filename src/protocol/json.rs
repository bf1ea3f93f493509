//! JSON sub-protocol (id 0x02)
//!
//! Structured key/value messages carried in base frames. The handshake is an
//! ordinary message tagged `type = "event"`, `event = "handshake"`.
//!
//! Older UDP peers nest `time`, `id`, `source`, `address` and `port` in a
//! `meta` object. `decode` keeps that object and fills the matching
//! top-level fields from it; `encode` always writes the flat form.

use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Message types accepted by `encode`
pub const ALLOWED_TYPES: [&str; 7] = [
    "write",
    "read",
    "response",
    "function",
    "event",
    "stream",
    "broadcast",
];

pub const HANDSHAKE_EVENT: &str = "handshake";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One JSON sub-protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonMessage {
    /// Target address: a string or a structured address
    pub address: Option<Value>,
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Unix time of creation (seconds)
    pub time: f64,
    pub id: u64,
    pub event: Option<String>,
    pub request_id: u64,
    pub request_response: bool,
    pub data: Map<String, Value>,
    /// Routing metadata of the legacy UDP layout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl Default for JsonMessage {
    fn default() -> Self {
        Self {
            address: None,
            source: None,
            kind: None,
            time: 0.0,
            id: 0,
            event: None,
            request_id: 0,
            request_response: false,
            data: Map::new(),
            meta: None,
        }
    }
}

/// Peer identity announced by a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub address: String,
    pub name: String,
}

impl JsonMessage {
    /// New message of `kind`, stamped with the current time and a fresh id
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            time: chrono::Utc::now().timestamp_micros() as f64 / 1e6,
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            ..Self::default()
        }
    }

    /// Event message with payload data
    pub fn event(name: impl Into<String>, data: Map<String, Value>) -> Self {
        let mut msg = Self::new("event");
        msg.event = Some(name.into());
        msg.data = data;
        msg
    }

    /// Handshake announcing this node's address and name
    pub fn handshake(address: impl Into<String>, name: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("address".into(), Value::String(address.into()));
        data.insert("name".into(), Value::String(name.into()));
        Self::event(HANDSHAKE_EVENT, data)
    }

    pub fn is_handshake(&self) -> bool {
        self.kind.as_deref() == Some("event") && self.event.as_deref() == Some(HANDSHAKE_EVENT)
    }

    /// Peer identity, if this is a well-formed handshake
    pub fn handshake_info(&self) -> Option<Handshake> {
        if !self.is_handshake() {
            return None;
        }
        let address = self.data.get("address")?.as_str()?.to_string();
        let name = self.data.get("name")?.as_str()?.to_string();
        Some(Handshake { address, name })
    }

    /// Serialize; the message type must be one of `ALLOWED_TYPES`
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self.kind.as_deref() {
            Some(kind) if ALLOWED_TYPES.contains(&kind) => {}
            Some(kind) => {
                return Err(CodecError::Malformed(format!(
                    "message type '{}' not allowed",
                    kind
                )))
            }
            None => return Err(CodecError::Malformed("message type missing".into())),
        }
        serde_json::to_vec(self).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    /// Parse; absent fields take their defaults
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut msg: Self =
            serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;
        msg.lift_meta();
        Ok(msg)
    }

    /// Sender port recorded by a legacy UDP peer
    pub fn meta_port(&self) -> Option<u16> {
        let port = self.meta.as_ref()?.get("port")?.as_u64()?;
        u16::try_from(port).ok()
    }

    fn lift_meta(&mut self) {
        let Some(meta) = &self.meta else {
            return;
        };
        if self.time == 0.0 {
            if let Some(time) = meta.get("time").and_then(Value::as_f64) {
                self.time = time;
            }
        }
        if self.id == 0 {
            if let Some(id) = meta.get("id").and_then(Value::as_u64) {
                self.id = id;
            }
        }
        if self.source.is_none() {
            self.source = meta
                .get("source")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }
        if self.address.is_none() {
            self.address = meta
                .get("address")
                .filter(|a| a.as_str().map_or(!a.is_null(), |s| !s.is_empty()))
                .cloned();
        }
    }
}
