//! Serial frame to/from the flight controller
//!
//! ```text
//! offset 0       : 0xAA (start)
//! offset 1       : message_type
//! offset 2       : payload_length
//! offset 3..102  : payload, zero-padded to 100 bytes
//! offset 103     : checksum = sum(bytes[0..102]) mod 256
//! ```

use super::layout::{FrameLayout, Route};
use crate::error::CodecError;
use bytes::Bytes;

/// One decoded serial frame, padding stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(message_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            payload: payload.into(),
        }
    }

    /// Encode this frame (always 104 bytes)
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode(self.message_type, &self.payload)
    }
}

/// Encode a payload into a fixed-size serial frame
pub fn encode(message_type: u8, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    FrameLayout::SERIAL.encode(message_type, Route::UNSPECIFIED, payload)
}

/// Validate and decode a serial frame from the start of `data`
pub fn decode(data: &[u8]) -> Result<Frame, CodecError> {
    let raw = FrameLayout::SERIAL.decode(data)?;
    Ok(Frame {
        message_type: raw.id,
        payload: Bytes::copy_from_slice(raw.payload),
    })
}
