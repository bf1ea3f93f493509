//! Framing codecs
//!
//! Separates encoding concerns from transport:
//! - **Layout**: the byte shape of one frame variant (`FrameLayout`)
//! - **Codec**: how a byte stream is cut into frames (resync scan, COBS)
//! - **Transport**: how bytes flow (Serial, UDP, TCP)
//!
//! Datagram transports decode each datagram directly with a layout; stream
//! transports feed chunks into a `Codec`, which buffers partial data.

pub mod base;
pub mod checksum;
pub mod cobs;
pub mod frame;
pub mod layout;
mod status;
pub mod stream;

pub use base::{BaseCodec, BaseFrame, BaseVariant};
pub use checksum::Checksum;
pub use cobs::CobsCodec;
pub use frame::Frame;
pub use layout::{FrameLayout, RawFrame, Route};
pub use stream::FrameSync;

use crate::error::CodecError;
use crate::logging::LogLevel;
use bytes::Bytes;

/// Item produced by a stream codec
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// Validated frame
    Frame { id: u8, route: Route, payload: Bytes },
    /// Text line sent by the firmware between frames (`OK: ...`, `ERR: ...`)
    Status {
        level: Option<LogLevel>,
        message: String,
    },
    /// A candidate frame was discarded; the stream continues
    Rejected(CodecError),
}

impl StreamItem {
    pub(crate) fn from_raw(raw: RawFrame<'_>) -> Self {
        Self::Frame {
            id: raw.id,
            route: raw.route,
            payload: Bytes::copy_from_slice(raw.payload),
        }
    }
}

/// Codec trait for framing a byte stream
///
/// A codec transforms raw stream chunks into frames (decode) and frames
/// into bytes for transmission (encode).
pub trait Codec: Send {
    /// Decode incoming bytes
    ///
    /// Calls `on_item` for each complete item detected.
    /// May buffer partial data internally.
    fn decode(&mut self, data: &[u8], on_item: impl FnMut(StreamItem));

    /// Encode one frame for transmission
    ///
    /// Appends encoded bytes to `output`.
    fn encode(
        &self,
        id: u8,
        route: Route,
        payload: &[u8],
        output: &mut Vec<u8>,
    ) -> Result<(), CodecError>;

    /// Drop buffered partial data; the next chunk starts a new stream
    fn reset(&mut self);
}
