//! COBS (Consistent Overhead Byte Stuffing) stream framing
//!
//! Encodes data so 0x00 never appears in payload, allowing it as frame
//! delimiter. Used on TCP streams: each base frame is COBS-encoded and
//! terminated by 0x00.

use super::layout::{FrameLayout, Route};
use super::{Codec, StreamItem};
use crate::constants::MAX_STREAM_FRAME;
use crate::error::CodecError;
use bytes::BytesMut;

pub const DELIMITER: u8 = 0x00;

/// Encode data using COBS, appending to `output`
///
/// Appends the encoded data with trailing 0x00 delimiter.
/// Returns number of bytes written.
pub fn encode_into(data: &[u8], output: &mut Vec<u8>) -> Result<usize, CodecError> {
    if data.len() > MAX_STREAM_FRAME - 2 {
        return Err(CodecError::PayloadTooLarge {
            len: data.len(),
            capacity: MAX_STREAM_FRAME - 2,
        });
    }

    let start = output.len();
    output.reserve(data.len() + (data.len() / 254) + 2);

    let mut code_index = output.len();
    output.push(0);
    let mut code: u8 = 1;

    for &byte in data {
        if byte == 0 {
            output[code_index] = code;
            code_index = output.len();
            output.push(0);
            code = 1;
        } else {
            output.push(byte);
            code += 1;
            if code == 255 {
                output[code_index] = code;
                code_index = output.len();
                output.push(0);
                code = 1;
            }
        }
    }

    output[code_index] = code;
    output.push(DELIMITER);
    Ok(output.len() - start)
}

/// Decode COBS-encoded data into `output`
///
/// Input should NOT include trailing delimiter.
/// Extends the buffer (does not clear).
/// Returns number of bytes written.
pub fn decode_into(encoded: &[u8], output: &mut BytesMut) -> Result<usize, CodecError> {
    let start_len = output.len();
    let mut i = 0;

    while i < encoded.len() {
        let code = encoded[i] as usize;
        if code == 0 {
            return Err(CodecError::Malformed("invalid COBS encoding".into()));
        }

        i += 1;
        let copy_len = code - 1;

        if i + copy_len > encoded.len() {
            return Err(CodecError::Malformed("invalid COBS encoding".into()));
        }

        output.extend_from_slice(&encoded[i..i + copy_len]);
        i += copy_len;

        if code < 255 && i < encoded.len() {
            output.extend_from_slice(&[0]);
        }
    }

    Ok(output.len() - start_len)
}

/// Delimited COBS codec carrying one frame per COBS block
pub struct CobsCodec {
    layout: FrameLayout,
    buffer: Vec<u8>,
    decoded: BytesMut,
    overflowed: bool,
}

impl CobsCodec {
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            layout,
            buffer: Vec::with_capacity(1024),
            decoded: BytesMut::with_capacity(1024),
            overflowed: false,
        }
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    fn finish_block(&mut self) -> Option<StreamItem> {
        if std::mem::take(&mut self.overflowed) {
            self.buffer.clear();
            return None;
        }
        if self.buffer.is_empty() {
            return None;
        }

        self.decoded.clear();
        let result = decode_into(&self.buffer, &mut self.decoded);
        self.buffer.clear();
        if let Err(e) = result {
            return Some(StreamItem::Rejected(e));
        }

        Some(match self.layout.decode(&self.decoded) {
            Ok(raw) => StreamItem::from_raw(raw),
            Err(e) => StreamItem::Rejected(e),
        })
    }
}

impl Codec for CobsCodec {
    fn decode(&mut self, data: &[u8], mut on_item: impl FnMut(StreamItem)) {
        for &byte in data {
            if byte == DELIMITER {
                if let Some(item) = self.finish_block() {
                    on_item(item);
                }
                continue;
            }
            if self.overflowed {
                continue;
            }

            self.buffer.push(byte);
            // Drop the block up to the next delimiter
            if self.buffer.len() > MAX_STREAM_FRAME {
                on_item(StreamItem::Rejected(CodecError::PayloadTooLarge {
                    len: self.buffer.len(),
                    capacity: MAX_STREAM_FRAME,
                }));
                self.buffer.clear();
                self.overflowed = true;
            }
        }
    }

    fn encode(
        &self,
        id: u8,
        route: Route,
        payload: &[u8],
        output: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        let frame = self.layout.encode(id, route, payload)?;
        encode_into(&frame, output)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }
}
