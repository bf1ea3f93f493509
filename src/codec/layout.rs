//! Generic frame layout
//!
//! The serial frame and both network base frames share one shape:
//!
//! ```text
//! [header...] [source addr] [destination addr] [id] [length] [payload] [checksum] [footer]
//! ```
//!
//! They differ only in the header bytes, whether address fields exist, the
//! width of the length field, whether the payload is zero-padded to a fixed
//! capacity, the checksum algorithm and the footer. A `FrameLayout` captures
//! those differences so one encoder/decoder serves all variants.

use super::checksum::Checksum;
use crate::constants::{BASE_FOOTER, BASE_HEADER, SERIAL_PAYLOAD_CAPACITY, SERIAL_START_BYTE};
use crate::error::{CodecError, FramingFault};
use std::fmt;
use std::net::Ipv4Addr;

/// Source/destination pair carried by network frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Route {
    /// Route used by layouts without address fields
    pub const UNSPECIFIED: Self = Self {
        source: Ipv4Addr::UNSPECIFIED,
        destination: Ipv4Addr::UNSPECIFIED,
    };

    pub fn new(source: Ipv4Addr, destination: Ipv4Addr) -> Self {
        Self {
            source,
            destination,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// Address fields of a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressField {
    /// No address fields (serial)
    None,
    /// Two 4-byte IPv4 addresses in network byte order
    Ipv4,
}

impl AddressField {
    /// Width of one address field in bytes
    pub const fn width(self) -> usize {
        match self {
            Self::None => 0,
            Self::Ipv4 => 4,
        }
    }
}

/// Width of the payload length field (little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthField {
    U8,
    U16,
    U32,
}

impl LengthField {
    pub const fn width(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Largest payload length the field can express
    pub const fn max(self) -> usize {
        match self {
            Self::U8 => u8::MAX as usize,
            Self::U16 => u16::MAX as usize,
            Self::U32 => u32::MAX as usize,
        }
    }
}

/// Decoded view into a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame<'a> {
    pub id: u8,
    pub route: Route,
    pub payload: &'a [u8],
}

/// Descriptor of one framing variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub header: &'static [u8],
    pub addresses: AddressField,
    pub length: LengthField,
    /// `Some(n)`: payload zero-padded to exactly `n` bytes
    pub padded_capacity: Option<usize>,
    pub checksum: Checksum,
    pub footer: Option<u8>,
}

impl FrameLayout {
    /// Serial frame to the flight controller (104 bytes fixed)
    pub const SERIAL: Self = Self {
        header: &[SERIAL_START_BYTE],
        addresses: AddressField::None,
        length: LengthField::U8,
        padded_capacity: Some(SERIAL_PAYLOAD_CAPACITY),
        checksum: Checksum::Sum8,
        footer: None,
    };

    /// UDP base frame (15 bytes overhead)
    pub const UDP: Self = Self {
        header: &BASE_HEADER,
        addresses: AddressField::Ipv4,
        length: LengthField::U16,
        padded_capacity: None,
        checksum: Checksum::Crc8,
        footer: Some(BASE_FOOTER),
    };

    /// TCP base frame (17 bytes overhead)
    pub const TCP: Self = Self {
        header: &BASE_HEADER,
        addresses: AddressField::Ipv4,
        length: LengthField::U32,
        padded_capacity: None,
        checksum: Checksum::Crc8,
        footer: Some(BASE_FOOTER),
    };

    /// Same layout with a different checksum algorithm
    pub const fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = checksum;
        self
    }

    const fn id_offset(&self) -> usize {
        self.header.len() + 2 * self.addresses.width()
    }

    const fn length_offset(&self) -> usize {
        self.id_offset() + 1
    }

    /// Bytes before the payload
    pub const fn prefix_len(&self) -> usize {
        self.length_offset() + self.length.width()
    }

    /// Bytes after the payload (checksum + optional footer)
    pub const fn trailer_len(&self) -> usize {
        1 + if self.footer.is_some() { 1 } else { 0 }
    }

    /// Fixed per-frame overhead, excluding payload and padding
    pub const fn overhead(&self) -> usize {
        self.prefix_len() + self.trailer_len()
    }

    /// Largest payload accepted by `encode`
    pub fn capacity(&self) -> usize {
        match self.padded_capacity {
            Some(capacity) => capacity.min(self.length.max()),
            None => self.length.max(),
        }
    }

    /// Total encoded length for a payload of `payload_len` bytes
    pub fn frame_len(&self, payload_len: usize) -> usize {
        self.overhead() + self.padded_capacity.unwrap_or(payload_len)
    }

    /// Append an encoded frame to `out`
    pub fn encode_into(
        &self,
        id: u8,
        route: Route,
        payload: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        let capacity = self.capacity();
        if payload.len() > capacity {
            return Err(CodecError::PayloadTooLarge {
                len: payload.len(),
                capacity,
            });
        }

        let start = out.len();
        out.reserve(self.frame_len(payload.len()));
        out.extend_from_slice(self.header);
        if self.addresses == AddressField::Ipv4 {
            out.extend_from_slice(&route.source.octets());
            out.extend_from_slice(&route.destination.octets());
        }
        out.push(id);
        // Checked against capacity above, which never exceeds u32::MAX
        let len_bytes = (payload.len() as u32).to_le_bytes();
        out.extend_from_slice(&len_bytes[..self.length.width()]);
        out.extend_from_slice(payload);
        if let Some(capacity) = self.padded_capacity {
            out.resize(start + self.prefix_len() + capacity, 0);
        }

        let checksum = self.checksum.compute(&out[start..]);
        out.push(checksum);
        if let Some(footer) = self.footer {
            out.push(footer);
        }
        Ok(())
    }

    /// Encode a frame into a new buffer
    pub fn encode(&self, id: u8, route: Route, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.encode_into(id, route, payload, &mut out)?;
        Ok(out)
    }

    /// Check that `data` starts with this layout's header bytes
    ///
    /// Only the bytes present are compared, so a partial header passes.
    pub fn check_header(&self, data: &[u8]) -> Result<(), FramingFault> {
        for (offset, (&expected, &found)) in self.header.iter().zip(data).enumerate() {
            if expected != found {
                return Err(FramingFault::Header { offset, found });
            }
        }
        Ok(())
    }

    /// Declared payload length, once the prefix is available
    pub fn declared_len(&self, data: &[u8]) -> Option<usize> {
        if data.len() < self.prefix_len() {
            return None;
        }
        let mut bytes = [0u8; 4];
        bytes[..self.length.width()].copy_from_slice(&data[self.length_offset()..self.prefix_len()]);
        Some(u32::from_le_bytes(bytes) as usize)
    }

    /// Validate and parse one frame
    ///
    /// Padded layouts accept trailing bytes after the fixed frame; variable
    /// layouts require the buffer to match the declared length exactly.
    pub fn decode<'a>(&self, data: &'a [u8]) -> Result<RawFrame<'a>, CodecError> {
        let Some(declared) = self.declared_len(data) else {
            self.check_header(data)?;
            return Err(FramingFault::TooShort {
                needed: self.frame_len(0),
                actual: data.len(),
            }
            .into());
        };
        self.check_header(data)?;

        let capacity = self.capacity();
        if declared > capacity {
            return Err(FramingFault::DeclaredTooLarge { declared, capacity }.into());
        }

        let expected = self.frame_len(declared);
        match self.padded_capacity {
            Some(_) if data.len() < expected => {
                return Err(FramingFault::TooShort {
                    needed: expected,
                    actual: data.len(),
                }
                .into());
            }
            None if data.len() != expected => {
                return Err(FramingFault::Length {
                    declared,
                    actual: data.len(),
                }
                .into());
            }
            _ => {}
        }

        let frame = &data[..expected];
        if let Some(footer) = self.footer {
            let found = frame[expected - 1];
            if found != footer {
                return Err(FramingFault::Footer { found }.into());
            }
        }

        let checksum_offset = expected - self.trailer_len();
        if self.checksum.is_validated() {
            let computed = self.checksum.compute(&frame[..checksum_offset]);
            let received = frame[checksum_offset];
            if computed != received {
                return Err(CodecError::Checksum {
                    expected: computed,
                    actual: received,
                });
            }
        }

        let route = match self.addresses {
            AddressField::None => Route::UNSPECIFIED,
            AddressField::Ipv4 => {
                let src = self.header.len();
                let dst = src + 4;
                Route::new(
                    Ipv4Addr::new(frame[src], frame[src + 1], frame[src + 2], frame[src + 3]),
                    Ipv4Addr::new(frame[dst], frame[dst + 1], frame[dst + 2], frame[dst + 3]),
                )
            }
        };

        let prefix = self.prefix_len();
        Ok(RawFrame {
            id: frame[self.id_offset()],
            route,
            payload: &frame[prefix..prefix + declared],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{TCP_OVERHEAD, UDP_OVERHEAD};

    fn route() -> Route {
        Route::new(Ipv4Addr::new(192, 168, 0, 10), Ipv4Addr::new(192, 168, 0, 255))
    }

    #[test]
    fn test_layout_geometry() {
        assert_eq!(FrameLayout::SERIAL.overhead(), 4);
        assert_eq!(FrameLayout::SERIAL.frame_len(0), 104);
        assert_eq!(FrameLayout::SERIAL.frame_len(57), 104);
        assert_eq!(FrameLayout::UDP.overhead(), UDP_OVERHEAD);
        assert_eq!(FrameLayout::TCP.overhead(), TCP_OVERHEAD);
        assert_eq!(FrameLayout::UDP.prefix_len(), 13);
        assert_eq!(FrameLayout::TCP.prefix_len(), 15);
        assert_eq!(FrameLayout::UDP.capacity(), 65_535);
    }

    #[test]
    fn test_udp_field_offsets() {
        let frame = FrameLayout::UDP.encode(0x02, route(), b"abc").unwrap();

        assert_eq!(frame.len(), 3 + 15);
        assert_eq!(&frame[0..2], &[0x55, 0x55]);
        assert_eq!(&frame[2..6], &[192, 168, 0, 10]);
        assert_eq!(&frame[6..10], &[192, 168, 0, 255]);
        assert_eq!(frame[10], 0x02);
        assert_eq!(&frame[11..13], &[3, 0]);
        assert_eq!(&frame[13..16], b"abc");
        assert_eq!(frame[17], 0x5D);
    }

    #[test]
    fn test_tcp_length_field_is_u32_le() {
        let payload = vec![7u8; 300];
        let frame = FrameLayout::TCP.encode(1, route(), &payload).unwrap();

        assert_eq!(&frame[11..15], &[0x2C, 0x01, 0x00, 0x00]);
        assert_eq!(frame.len(), 300 + 17);
    }

    #[test]
    fn test_checksum_covers_preceding_bytes() {
        let frame = FrameLayout::UDP.encode(2, route(), b"xyz").unwrap();
        let checksum_offset = frame.len() - 2;
        assert_eq!(
            frame[checksum_offset],
            Checksum::Crc8.compute(&frame[..checksum_offset])
        );
    }

    #[test]
    fn test_legacy_checksum_written_as_zero() {
        let layout = FrameLayout::UDP.with_checksum(Checksum::None);
        let mut frame = layout.encode(2, route(), b"xyz").unwrap();
        let checksum_offset = frame.len() - 2;
        assert_eq!(frame[checksum_offset], 0);

        // Not validated, so any value passes
        frame[checksum_offset] = 0x99;
        assert!(layout.decode(&frame).is_ok());
    }

    #[test]
    fn test_decode_rejects_bad_header() {
        let mut frame = FrameLayout::UDP.encode(2, route(), b"x").unwrap();
        frame[1] = 0x56;
        assert_eq!(
            FrameLayout::UDP.decode(&frame),
            Err(CodecError::Framing(FramingFault::Header {
                offset: 1,
                found: 0x56
            }))
        );
    }

    #[test]
    fn test_decode_rejects_bad_footer() {
        let mut frame = FrameLayout::TCP.encode(2, route(), b"x").unwrap();
        let last = frame.len() - 1;
        frame[last] = 0x00;
        assert_eq!(
            FrameLayout::TCP.decode(&frame),
            Err(CodecError::Framing(FramingFault::Footer { found: 0x00 }))
        );
    }

    #[test]
    fn test_decode_rejects_extra_bytes_on_variable_layout() {
        let mut frame = FrameLayout::UDP.encode(2, route(), b"x").unwrap();
        frame.push(0);
        assert!(matches!(
            FrameLayout::UDP.decode(&frame),
            Err(CodecError::Framing(FramingFault::Length { declared: 1, .. }))
        ));
    }

    #[test]
    fn test_decode_accepts_trailing_bytes_on_padded_layout() {
        let mut frame = FrameLayout::SERIAL.encode(1, Route::UNSPECIFIED, &[1, 2]).unwrap();
        frame.extend_from_slice(&[0xAA, 0x00]);
        let raw = FrameLayout::SERIAL.decode(&frame).unwrap();
        assert_eq!(raw.payload, &[1, 2]);
    }

    #[test]
    fn test_decode_rejects_declared_length_over_capacity() {
        let mut frame = FrameLayout::SERIAL.encode(1, Route::UNSPECIFIED, &[]).unwrap();
        frame[2] = 101;
        assert_eq!(
            FrameLayout::SERIAL.decode(&frame),
            Err(CodecError::Framing(FramingFault::DeclaredTooLarge {
                declared: 101,
                capacity: 100
            }))
        );
    }

    #[test]
    fn test_decode_short_buffer() {
        assert!(matches!(
            FrameLayout::UDP.decode(&[0x55, 0x55, 1]),
            Err(CodecError::Framing(FramingFault::TooShort { .. }))
        ));
        assert!(matches!(
            FrameLayout::UDP.decode(&[]),
            Err(CodecError::Framing(FramingFault::TooShort { .. }))
        ));
    }

    #[test]
    fn test_check_header_partial() {
        assert!(FrameLayout::UDP.check_header(&[0x55]).is_ok());
        assert!(FrameLayout::UDP.check_header(&[]).is_ok());
        assert!(FrameLayout::UDP.check_header(&[0x55, 0x00]).is_err());
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let payload = vec![0u8; 101];
        assert_eq!(
            FrameLayout::SERIAL.encode(1, Route::UNSPECIFIED, &payload),
            Err(CodecError::PayloadTooLarge {
                len: 101,
                capacity: 100
            })
        );
    }

    #[test]
    fn test_encode_into_appends() {
        let mut out = vec![0xEE];
        FrameLayout::UDP
            .encode_into(2, route(), b"a", &mut out)
            .unwrap();
        assert_eq!(out[0], 0xEE);
        assert_eq!(out.len(), 1 + 16);
        assert!(FrameLayout::UDP.decode(&out[1..]).is_ok());
    }
}
