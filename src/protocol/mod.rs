//! Application sub-protocols carried in base frames
//!
//! After a base frame passes its framing checks, the sub-protocol id selects
//! the payload decoder. The outcome is a typed `Inbound` value so callers can
//! tell corruption apart from a valid frame of an unknown protocol.

pub mod json;

pub use json::{Handshake, JsonMessage};

use crate::codec::{BaseCodec, BaseFrame, Route};
use crate::error::CodecError;
use std::net::Ipv4Addr;

/// Sub-protocol id of the JSON protocol
pub const JSON_PROTOCOL_ID: u8 = 0x02;

/// Result of dispatching one received unit
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Application message for subscribers
    Message { route: Route, message: JsonMessage },
    /// Handshake; updates the peer record, not delivered
    Handshake { route: Route, handshake: Handshake },
    /// Valid base frame, sub-protocol not registered; dropped
    UnknownProtocol(u8),
    /// Base framing or checksum failed
    Corrupted(CodecError),
    /// Valid base frame whose payload could not be parsed
    Malformed(String),
}

impl Inbound {
    /// Whether the unit counts as a received packet
    pub fn is_valid_frame(&self) -> bool {
        !matches!(self, Self::Corrupted(_))
    }
}

/// Routes base frames to sub-protocol decoders
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    codec: BaseCodec,
}

impl Dispatcher {
    pub fn new(codec: BaseCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &BaseCodec {
        &self.codec
    }

    /// Sub-protocol ids this dispatcher decodes
    pub fn is_registered(&self, sub_protocol: u8) -> bool {
        sub_protocol == JSON_PROTOCOL_ID
    }

    /// Decode a complete base frame (one datagram)
    pub fn decode(&self, data: &[u8]) -> Inbound {
        match self.codec.decode(data) {
            Ok(frame) => self.dispatch(&frame),
            Err(e) => Inbound::Corrupted(e),
        }
    }

    /// Interpret an already validated base frame
    pub fn dispatch(&self, frame: &BaseFrame) -> Inbound {
        if !self.is_registered(frame.sub_protocol) {
            return Inbound::UnknownProtocol(frame.sub_protocol);
        }

        let message = match JsonMessage::decode(&frame.payload) {
            Ok(message) => message,
            Err(e) => return Inbound::Malformed(e.to_string()),
        };
        let route = Route::new(frame.source, frame.destination);

        if message.is_handshake() {
            return match message.handshake_info() {
                Some(handshake) => Inbound::Handshake { route, handshake },
                None => Inbound::Malformed("handshake without address/name".into()),
            };
        }
        Inbound::Message { route, message }
    }

    /// Encode a JSON message into a base frame
    pub fn encode(
        &self,
        message: &JsonMessage,
        source: Ipv4Addr,
        destination: Ipv4Addr,
    ) -> Result<Vec<u8>, CodecError> {
        let payload = message.encode()?;
        self.codec.encode(&BaseFrame::new(
            source,
            destination,
            JSON_PROTOCOL_ID,
            payload,
        ))
    }
}
