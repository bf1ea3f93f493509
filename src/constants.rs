//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Serial frame
// =============================================================================

/// Start byte of every serial frame
pub const SERIAL_START_BYTE: u8 = 0xAA;

/// Fixed payload capacity of a serial frame (bytes)
pub const SERIAL_PAYLOAD_CAPACITY: usize = 100;

/// Total length of a serial frame: 3 header bytes + payload + checksum
pub const SERIAL_FRAME_LEN: usize = 3 + SERIAL_PAYLOAD_CAPACITY + 1;

/// Default baud rate of the flight controller UART
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

// =============================================================================
// Network base frame
// =============================================================================

/// Header bytes of a UDP/TCP base frame
pub const BASE_HEADER: [u8; 2] = [0x55, 0x55];

/// Footer byte of a UDP/TCP base frame
pub const BASE_FOOTER: u8 = 0x5D;

/// Fixed overhead of a UDP base frame (2-byte length field)
pub const UDP_OVERHEAD: usize = 15;

/// Fixed overhead of a TCP base frame (4-byte length field)
pub const TCP_OVERHEAD: usize = 17;

// =============================================================================
// Network
// =============================================================================

/// Default UDP port of the testbed network
pub const DEFAULT_UDP_PORT: u16 = 37020;

/// Default TCP port of the testbed device server
pub const DEFAULT_TCP_PORT: u16 = 6666;

/// Poll tick of the broadcast scheduler (milliseconds)
pub const BROADCAST_TICK_MS: u64 = 10;

/// Timeout of an outgoing TCP connection attempt (milliseconds)
pub const TCP_CONNECT_TIMEOUT_MS: u64 = 2000;

/// Pending-connection backlog of the TCP listener
pub const TCP_LISTEN_BACKLOG: i32 = 8;

// =============================================================================
// Timing - Reconnection
// =============================================================================

/// Delay between serial reconnection attempts (seconds)
pub const RECONNECT_DELAY_SECS: u64 = 2;

/// Minimum interval between rate updates (seconds)
pub const RATE_UPDATE_MIN_INTERVAL_SECS: f64 = 0.1;

// =============================================================================
// Retry
// =============================================================================

/// Maximum socket bind retry attempts
pub const MAX_SOCKET_RETRY_ATTEMPTS: u32 = 5;

/// Base delay between retry attempts (milliseconds)
pub const RETRY_BASE_DELAY_MS: u64 = 200;

// =============================================================================
// Buffers
// =============================================================================

/// Socket / serial read buffer size
pub const READ_BUFFER_SIZE: usize = 8192;

/// Largest encoded frame on a TCP stream, raw or COBS framed
pub const MAX_STREAM_FRAME: usize = 65_536;

/// Channel capacity for async message passing
pub const CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Serial
// =============================================================================

/// Consecutive zero-byte reads before assuming port disconnected
pub const SERIAL_DISCONNECT_THRESHOLD: u32 = 10;

/// Read timeout of the serial port (milliseconds)
pub const SERIAL_READ_TIMEOUT_MS: u64 = 10;

/// Longest firmware status line kept before it is dropped (bytes)
pub const MAX_STATUS_LINE: usize = 256;
