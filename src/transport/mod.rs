//! Transport abstraction for byte-level I/O
//!
//! Separates I/O concerns from protocol logic:
//! - **Transport**: How bytes flow (Serial, UDP, TCP)
//! - **Codec**: How frames are encoded/decoded (handled separately)
//!
//! Each transport manages its own execution model internally:
//! - Serial: blocking threads for low latency
//! - UDP/TCP: async tokio tasks

pub mod serial;
pub mod tcp;
pub mod udp;

pub use serial::SerialTransport;
pub use tcp::{TcpMode, TcpTransport, STREAM_RESTART};
pub use udp::{Datagram, UdpTransport};

use bytes::Bytes;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::Result;

/// Channels for bidirectional communication with a transport
///
/// The transport owns the underlying I/O (socket, serial port)
/// and communicates via these channels. When the transport stops
/// (shutdown or error), it closes the channels.
pub struct TransportChannels<T = Bytes> {
    /// Receive units from the transport
    ///
    /// Returns `None` when the transport has stopped.
    pub rx: mpsc::Receiver<T>,

    /// Send units to the transport
    pub tx: mpsc::Sender<T>,
}

/// Trait for spawnable transports
///
/// A transport abstracts byte-level I/O operations. It handles:
/// - Opening/closing connections
/// - Reading/writing raw bytes
/// - Threading model (blocking or async)
///
/// A transport does NOT handle:
/// - Framing (that's the codec's job)
/// - Statistics or logging (that's the link's job)
/// - Reconnection logic (that's the link's job)
///
/// # Lifecycle
///
/// 1. Create transport with configuration
/// 2. Call `spawn()` to start I/O in background
/// 3. Use returned channels for communication
/// 4. Transport runs until:
///    - `shutdown` flag is set, OR
///    - A fatal error occurs (disconnect, etc.)
/// 5. Transport closes channels when stopping
pub trait Transport: Send + 'static {
    /// Unit carried by the channels (stream chunk or datagram)
    type Item: Send + 'static;

    /// Spawn the transport in background
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be initialized
    /// (e.g., port not found, bind failed).
    fn spawn(self, shutdown: Arc<AtomicBool>) -> Result<TransportChannels<Self::Item>>;
}
