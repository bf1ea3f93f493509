//! Centralized error types
//!
//! Two families live here:
//! - `CodecError`: a single frame, packet or payload could not be
//!   encoded/decoded. Always per unit and recoverable; the next unit is
//!   independent.
//! - `LinkError`: a resource failed (port, socket, config file). These end
//!   the connection that hit them.

use std::fmt;
use std::path::PathBuf;

// =============================================================================
// Codec errors
// =============================================================================

/// Which framing check rejected a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingFault {
    /// Start/header byte at `offset` did not match
    Header { offset: usize, found: u8 },
    /// Footer byte did not match
    Footer { found: u8 },
    /// Buffer length does not match the declared payload length
    Length { declared: usize, actual: usize },
    /// Declared payload length exceeds the layout capacity
    DeclaredTooLarge { declared: usize, capacity: usize },
    /// Buffer shorter than the fixed frame overhead
    TooShort { needed: usize, actual: usize },
}

impl fmt::Display for FramingFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header { offset, found } => {
                write!(f, "bad header byte 0x{:02X} at offset {}", found, offset)
            }
            Self::Footer { found } => write!(f, "bad footer byte 0x{:02X}", found),
            Self::Length { declared, actual } => write!(
                f,
                "length mismatch: declared payload {} but buffer is {} bytes",
                declared, actual
            ),
            Self::DeclaredTooLarge { declared, capacity } => {
                write!(f, "declared payload {} exceeds capacity {}", declared, capacity)
            }
            Self::TooShort { needed, actual } => {
                write!(f, "buffer too short: {} < {}", actual, needed)
            }
        }
    }
}

/// Per-unit encode/decode failure
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Header, footer or length check failed
    Framing(FramingFault),
    /// Checksum byte does not match the recomputed value
    Checksum { expected: u8, actual: u8 },
    /// Fewer bytes than the payload structure requires
    TruncatedPayload {
        layout: &'static str,
        needed: usize,
        available: usize,
    },
    /// Message-type id not present in the registry
    UnknownMessageType(u8),
    /// Payload does not fit the frame
    PayloadTooLarge { len: usize, capacity: usize },
    /// A field holds a value outside its domain (e.g. arming byte 7)
    InvalidValue { field: &'static str, value: u32 },
    /// Application payload could not be parsed or built
    Malformed(String),
}

impl std::error::Error for CodecError {}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framing(fault) => write!(f, "Framing error: {}", fault),
            Self::Checksum { expected, actual } => write!(
                f,
                "Checksum mismatch: expected 0x{:02X}, got 0x{:02X}",
                expected, actual
            ),
            Self::TruncatedPayload {
                layout,
                needed,
                available,
            } => write!(
                f,
                "Truncated {} payload: need {} bytes, have {}",
                layout, needed, available
            ),
            Self::UnknownMessageType(id) => write!(f, "Unknown message type {}", id),
            Self::PayloadTooLarge { len, capacity } => {
                write!(f, "Payload too large: {} bytes (max {})", len, capacity)
            }
            Self::InvalidValue { field, value } => {
                write!(f, "Invalid value {} for {}", value, field)
            }
            Self::Malformed(reason) => write!(f, "Malformed payload: {}", reason),
        }
    }
}

impl From<FramingFault> for CodecError {
    fn from(fault: FramingFault) -> Self {
        Self::Framing(fault)
    }
}

// =============================================================================
// Link errors
// =============================================================================

/// Resource-level errors of a connection
#[derive(Debug)]
pub enum LinkError {
    // === Transport ===
    /// Failed to open serial port
    SerialOpen {
        port: String,
        source: std::io::Error,
    },
    /// Serial port enumeration failed
    SerialEnumerate { source: std::io::Error },

    // === Network ===
    /// Failed to bind UDP socket
    UdpBind { port: u16, source: std::io::Error },
    /// Failed to bind TCP listener
    TcpBind { port: u16, source: std::io::Error },
    /// Failed to connect to a TCP peer
    TcpConnect {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    /// Outgoing queue full, message dropped
    QueueFull { queue: &'static str },
    /// Message could not be encoded for sending
    Codec(CodecError),

    // === Config ===
    /// Config file could not be read or written
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },

    // === Detection ===
    /// No device found matching configuration
    NoDeviceFound,
    /// Multiple devices found matching configuration
    MultipleDevicesFound { count: usize },

    // === Runtime ===
    /// Tokio runtime creation failed
    Runtime { source: std::io::Error },
    /// Console input could not be read
    Stdin { source: std::io::Error },
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SerialOpen { source, .. }
            | Self::SerialEnumerate { source }
            | Self::UdpBind { source, .. }
            | Self::TcpBind { source, .. }
            | Self::TcpConnect { source, .. }
            | Self::ConfigRead { source, .. }
            | Self::Runtime { source }
            | Self::Stdin { source } => Some(source),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerialOpen { port, source } => {
                write!(f, "Cannot open serial port {}: {}", port, source)
            }
            Self::SerialEnumerate { source } => {
                write!(f, "Cannot list serial ports: {}", source)
            }
            Self::UdpBind { port, .. } => write!(f, "Cannot bind UDP port {}", port),
            Self::TcpBind { port, .. } => write!(f, "Cannot bind TCP port {}", port),
            Self::TcpConnect { addr, .. } => write!(f, "Cannot connect to {}", addr),
            Self::QueueFull { queue } => write!(f, "{} queue full, message dropped", queue),
            Self::Codec(e) => write!(f, "Cannot encode message: {}", e),
            Self::ConfigRead { path, .. } => write!(f, "Config IO error: {}", path.display()),
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
            Self::NoDeviceFound => write!(f, "No device found"),
            Self::MultipleDevicesFound { count } => {
                write!(f, "Multiple devices found ({})", count)
            }
            Self::Runtime { .. } => write!(f, "Failed to create runtime"),
            Self::Stdin { .. } => write!(f, "Cannot read console input"),
        }
    }
}

impl From<CodecError> for LinkError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

/// Alias for Result with LinkError
pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::Checksum {
            expected: 0x12,
            actual: 0x34,
        };
        assert_eq!(err.to_string(), "Checksum mismatch: expected 0x12, got 0x34");

        let err: CodecError = FramingFault::Footer { found: 0x00 }.into();
        assert_eq!(err.to_string(), "Framing error: bad footer byte 0x00");
    }

    #[test]
    fn test_link_error_source_chain() {
        let err = LinkError::UdpBind {
            port: 37020,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy"),
        };
        assert!(err.source().is_some());
        assert!(LinkError::NoDeviceFound.source().is_none());

        let err: LinkError = CodecError::UnknownMessageType(9).into();
        assert!(err.source().is_some());
        assert_eq!(
            LinkError::QueueFull { queue: "udp tx" }.to_string(),
            "udp tx queue full, message dropped"
        );
    }
}
