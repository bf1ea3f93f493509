//! Resynchronising frame decoder for byte streams
//!
//! The flight controller UART carries binary frames and text status lines on
//! the same wire, and a stream may start mid-frame. The decoder:
//!
//! 1. Hunts for the first header byte. Printable bytes seen while hunting are
//!    collected into a status line (emitted on `\n`); anything else is dropped.
//! 2. Waits until the length field is available, rejects declared lengths
//!    above capacity.
//! 3. Waits for the complete frame, validates it with the layout.
//! 4. On any rejection, reports it and resumes the scan one byte after the
//!    rejected header byte, so a valid frame hidden inside garbage is found.

use super::layout::{FrameLayout, Route};
use super::{status, Codec, StreamItem};
use crate::constants::{MAX_STATUS_LINE, MAX_STREAM_FRAME};
use crate::error::{CodecError, FramingFault};

/// Outcome of examining a candidate at a header byte
enum Candidate {
    /// More bytes needed
    Incomplete,
    /// Valid frame of the given encoded length
    Frame(StreamItem, usize),
    /// Header byte was not followed by the rest of the header
    Noise,
    /// Candidate rejected
    Rejected(CodecError),
}

/// Stream decoder for any `FrameLayout`
pub struct FrameSync {
    layout: FrameLayout,
    buffer: Vec<u8>,
    line: Vec<u8>,
    status_lines: bool,
    max_payload: usize,
    discarded: u64,
}

impl FrameSync {
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            layout,
            buffer: Vec::with_capacity(layout.frame_len(0).max(256)),
            line: Vec::new(),
            status_lines: false,
            max_payload: layout
                .capacity()
                .min(MAX_STREAM_FRAME.saturating_sub(layout.overhead())),
            discarded: 0,
        }
    }

    /// Decoder for the flight controller UART (frames + status lines)
    pub fn serial() -> Self {
        Self::new(FrameLayout::SERIAL).with_status_lines(true)
    }

    /// Collect printable text between frames into status lines
    pub fn with_status_lines(mut self, enabled: bool) -> Self {
        self.status_lines = enabled;
        self
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Largest payload this decoder accepts
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Bytes dropped while hunting for a header
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Bytes held for an incomplete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop partial frame and partial line (e.g. after reconnect)
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.line.clear();
    }

    fn candidate(&self, data: &[u8]) -> Candidate {
        if self.layout.check_header(data).is_err() {
            return Candidate::Noise;
        }
        let Some(declared) = self.layout.declared_len(data) else {
            return Candidate::Incomplete;
        };
        if declared > self.max_payload {
            return Candidate::Rejected(
                FramingFault::DeclaredTooLarge {
                    declared,
                    capacity: self.max_payload,
                }
                .into(),
            );
        }

        let len = self.layout.frame_len(declared);
        if data.len() < len {
            return Candidate::Incomplete;
        }
        match self.layout.decode(&data[..len]) {
            Ok(raw) => Candidate::Frame(StreamItem::from_raw(raw), len),
            Err(e) => Candidate::Rejected(e),
        }
    }

    fn hunt(&mut self, byte: u8, on_item: &mut impl FnMut(StreamItem)) {
        if !self.status_lines {
            self.discarded += 1;
            return;
        }
        match byte {
            b'\n' => {
                let line = std::mem::take(&mut self.line);
                let (level, message) = status::parse(&String::from_utf8_lossy(&line));
                if !message.is_empty() {
                    on_item(StreamItem::Status { level, message });
                }
            }
            b'\r' | b'\t' | 0x20..=0x7E => {
                self.line.push(byte);
                if self.line.len() > MAX_STATUS_LINE {
                    self.discarded += self.line.len() as u64;
                    self.line.clear();
                }
            }
            _ => self.discarded += 1,
        }
    }
}

impl Codec for FrameSync {
    fn decode(&mut self, data: &[u8], mut on_item: impl FnMut(StreamItem)) {
        self.buffer.extend_from_slice(data);
        let start = self.layout.header[0];

        let mut pos = 0;
        while pos < self.buffer.len() {
            let byte = self.buffer[pos];
            if byte != start {
                self.hunt(byte, &mut on_item);
                pos += 1;
                continue;
            }

            match self.candidate(&self.buffer[pos..]) {
                Candidate::Incomplete => break,
                Candidate::Frame(item, len) => {
                    on_item(item);
                    pos += len;
                }
                Candidate::Noise => {
                    self.discarded += 1;
                    pos += 1;
                }
                Candidate::Rejected(err) => {
                    on_item(StreamItem::Rejected(err));
                    pos += 1;
                }
            }
        }

        self.buffer.drain(..pos);
    }

    fn encode(
        &self,
        id: u8,
        route: Route,
        payload: &[u8],
        output: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        if payload.len() > self.max_payload {
            return Err(CodecError::PayloadTooLarge {
                len: payload.len(),
                capacity: self.max_payload,
            });
        }
        self.layout.encode_into(id, route, payload, output)
    }

    fn reset(&mut self) {
        self.clear();
    }
}
