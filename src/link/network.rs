//! Connection state shared by the UDP node and TCP connections
//!
//! Every received unit goes through `Connection::accept`:
//! - corrupted units count as `error_packets`
//! - valid base frames count as `received` and refresh `last_contact`
//! - handshakes update the peer record and are not delivered
//! - JSON messages are delivered as `NetworkEvent::Message`

use super::stats::LinkStats;
use crate::codec::{BaseFrame, Route, StreamItem};
use crate::error::CodecError;
use crate::logging::{self, LogEntry};
use crate::protocol::{Dispatcher, Handshake, Inbound, JsonMessage};
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// What is known about the remote side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerRecord {
    /// Self-reported address from the last handshake
    pub address: Option<String>,
    /// Self-reported name from the last handshake
    pub name: Option<String>,
    /// Transport endpoint of the last valid unit
    pub endpoint: Option<SocketAddr>,
    pub last_contact: Option<DateTime<Local>>,
}

impl PeerRecord {
    /// Handshake address as IPv4, if it parses
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.address.as_deref()?.parse().ok()
    }
}

/// Event surfaced to the application
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    /// Application message for subscribers
    Message {
        route: Route,
        message: JsonMessage,
        from: Option<SocketAddr>,
    },
    /// A handshake updated the peer record
    PeerUpdated(PeerRecord),
}

/// Per-connection protocol state
pub struct Connection {
    dispatcher: Dispatcher,
    local: Ipv4Addr,
    peer: RwLock<PeerRecord>,
    connected: AtomicBool,
    stats: Arc<LinkStats>,
    log_tx: Option<mpsc::Sender<LogEntry>>,
}

impl Connection {
    pub fn new(
        dispatcher: Dispatcher,
        local: Ipv4Addr,
        log_tx: Option<mpsc::Sender<LogEntry>>,
    ) -> Self {
        Self {
            dispatcher,
            local,
            peer: RwLock::new(PeerRecord::default()),
            connected: AtomicBool::new(false),
            stats: Arc::new(LinkStats::new()),
            log_tx,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Address written into the source field of outgoing frames
    pub fn local(&self) -> Ipv4Addr {
        self.local
    }

    pub fn stats(&self) -> &Arc<LinkStats> {
        &self.stats
    }

    /// Copy of the peer record
    pub fn peer(&self) -> PeerRecord {
        self.peer.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Handshake announcing this side under `name`
    pub fn handshake(&self, name: &str) -> JsonMessage {
        JsonMessage::handshake(self.local.to_string(), name)
    }

    /// Process one datagram holding exactly one base frame
    pub fn receive(&self, data: &[u8], from: Option<SocketAddr>) -> Option<NetworkEvent> {
        let inbound = self.dispatcher.decode(data);
        self.accept(inbound, data.len(), from)
    }

    /// Process one item of a stream codec
    pub fn receive_item(&self, item: StreamItem, from: Option<SocketAddr>) -> Option<NetworkEvent> {
        match item {
            StreamItem::Frame { id, route, payload } => {
                let size = self.dispatcher.codec().layout().frame_len(payload.len());
                let frame = BaseFrame::new(route.source, route.destination, id, payload);
                let inbound = self.dispatcher.dispatch(&frame);
                self.accept(inbound, size, from)
            }
            StreamItem::Rejected(e) => self.accept(Inbound::Corrupted(e), 0, from),
            StreamItem::Status { message, .. } => {
                debug!("ignoring text on network stream: {}", message);
                None
            }
        }
    }

    /// Apply a dispatch result to counters and peer state
    pub fn accept(
        &self,
        inbound: Inbound,
        size: usize,
        from: Option<SocketAddr>,
    ) -> Option<NetworkEvent> {
        if let Inbound::Corrupted(e) = &inbound {
            self.stats.record_error();
            debug!("corrupted unit from {:?}: {}", from, e);
            return None;
        }

        self.stats.record_received(size);
        self.touch(from);

        match inbound {
            Inbound::Message { route, message } => {
                let label = message.kind.clone().unwrap_or_else(|| "json".into());
                logging::try_log(&self.log_tx, LogEntry::frame_in(label, size));
                Some(NetworkEvent::Message {
                    route,
                    message,
                    from,
                })
            }
            Inbound::Handshake { handshake, .. } => Some(self.apply_handshake(handshake)),
            Inbound::UnknownProtocol(id) => {
                debug!("dropping frame of unknown sub-protocol {}", id);
                None
            }
            Inbound::Malformed(reason) => {
                debug!("malformed payload from {:?}: {}", from, reason);
                None
            }
            Inbound::Corrupted(_) => None,
        }
    }

    /// Encode a JSON message for `destination`
    ///
    /// Does not count the frame as sent; the caller does once it is queued.
    pub fn encode(
        &self,
        message: &JsonMessage,
        destination: Ipv4Addr,
    ) -> Result<Vec<u8>, CodecError> {
        self.dispatcher.encode(message, self.local, destination)
    }

    fn touch(&self, from: Option<SocketAddr>) {
        let mut peer = self.peer.write();
        peer.last_contact = Some(Local::now());
        if from.is_some() {
            peer.endpoint = from;
        }
    }

    fn apply_handshake(&self, handshake: Handshake) -> NetworkEvent {
        let record = {
            let mut peer = self.peer.write();
            peer.address = Some(handshake.address.clone());
            peer.name = Some(handshake.name.clone());
            peer.clone()
        };
        info!("handshake from {} ({})", handshake.name, handshake.address);
        logging::try_log(
            &self.log_tx,
            LogEntry::system(format!(
                "Handshake: {} ({})",
                handshake.name, handshake.address
            )),
        );
        NetworkEvent::PeerUpdated(record)
    }
}
