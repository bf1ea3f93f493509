//! IKARUS link: framing, payload registry and transports for the IKARUS
//! flight controller and its testbed network
//!
//! Layers, bottom up:
//! - `codec`: serial frames, UDP/TCP base frames, checksums, stream framing
//! - `registry`: message-type ids and packed payload layouts
//! - `protocol`: sub-protocols carried in base frames, dispatcher
//! - `transport`: serial port, UDP socket, TCP stream
//! - `link`: sessions gluing transports to codecs

pub mod cli;
pub mod codec;
pub mod config;
pub mod console;
pub mod constants;
pub mod error;
pub mod link;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use error::{CodecError, FramingFault, LinkError, Result};
