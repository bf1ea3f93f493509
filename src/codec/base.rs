//! Base frame of the UDP/TCP testbed network
//!
//! ```text
//! | BYTE       | NAME          | VALUE
//! | 0..1       | HEADER        | 0x55 0x55
//! | 2..5       | SOURCE        | IPv4, network order
//! | 6..9       | DESTINATION   | IPv4, network order
//! | 10         | PROTOCOL      | sub-protocol id
//! | 11..       | LEN           | u16 LE (UDP) / u32 LE (TCP)
//! | ..         | PAYLOAD       | LEN bytes, no padding
//! | ..         | CHECKSUM      | over all preceding bytes
//! | last       | FOOTER        | 0x5D
//! ```

use super::checksum::Checksum;
use super::layout::{FrameLayout, Route};
use crate::error::CodecError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Which network variant a codec speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseVariant {
    /// 2-byte length field
    Udp,
    /// 4-byte length field
    Tcp,
}

/// One decoded base frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseFrame {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub sub_protocol: u8,
    pub payload: Bytes,
}

impl BaseFrame {
    pub fn new(
        source: Ipv4Addr,
        destination: Ipv4Addr,
        sub_protocol: u8,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            source,
            destination,
            sub_protocol,
            payload: payload.into(),
        }
    }
}

/// Encoder/decoder for one base frame variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseCodec {
    layout: FrameLayout,
}

impl BaseCodec {
    pub fn new(variant: BaseVariant, checksum: Checksum) -> Self {
        let layout = match variant {
            BaseVariant::Udp => FrameLayout::UDP,
            BaseVariant::Tcp => FrameLayout::TCP,
        };
        Self {
            layout: layout.with_checksum(checksum),
        }
    }

    pub fn udp() -> Self {
        Self::new(BaseVariant::Udp, Checksum::default())
    }

    pub fn tcp() -> Self {
        Self::new(BaseVariant::Tcp, Checksum::default())
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Encode a frame; fails only if the payload overflows the length field
    pub fn encode(&self, frame: &BaseFrame) -> Result<Vec<u8>, CodecError> {
        self.layout.encode(
            frame.sub_protocol,
            Route::new(frame.source, frame.destination),
            &frame.payload,
        )
    }

    /// Validate header, exact length, footer and checksum, then parse
    pub fn decode(&self, data: &[u8]) -> Result<BaseFrame, CodecError> {
        let raw = self.layout.decode(data)?;
        Ok(BaseFrame {
            source: raw.route.source,
            destination: raw.route.destination,
            sub_protocol: raw.id,
            payload: Bytes::copy_from_slice(raw.payload),
        })
    }
}
