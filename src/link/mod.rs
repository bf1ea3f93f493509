//! Links: per-connection glue between transports and codecs
//!
//! - `serial`: flight controller UART with reconnection
//! - `udp`: testbed network node with periodic broadcasts
//! - `tcp`: stream connection to a testbed device
//!
//! Links own their transports; nothing here is global.

pub mod broadcast;
pub mod network;
pub mod serial;
pub mod stats;
pub mod tcp;
pub mod udp;

pub use broadcast::{Broadcast, BroadcastScheduler};
pub use network::{Connection, NetworkEvent, PeerRecord};
pub use serial::{Outbound, SerialEvent, SerialHandle, SerialLink, SerialSession, SessionEnd};
pub use stats::{LinkStats, StatsSnapshot};
pub use tcp::{StreamCodec, TcpConnection, TcpHandle};
pub use udp::{UdpNode, UdpNodeHandle};
