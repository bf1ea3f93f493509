//! TCP connection to a testbed device
//!
//! A byte stream carrying TCP base frames. The stream codec (COBS-delimited
//! or raw resynchronising scan) cuts it into frames; each frame then goes
//! through the shared `Connection` state.

use super::network::{Connection, NetworkEvent};
use crate::codec::{BaseCodec, BaseVariant, Codec, CobsCodec, FrameSync, Route};
use crate::config::{NetworkConfig, StreamFraming};
use crate::constants::CHANNEL_CAPACITY;
use crate::error::CodecError;
use crate::logging::{self, LogEntry};
use crate::protocol::{Dispatcher, JsonMessage, JSON_PROTOCOL_ID};
use crate::transport::TransportChannels;
use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Stream codec selected by configuration
pub enum StreamCodec {
    Cobs(CobsCodec),
    Raw(FrameSync),
}

impl StreamCodec {
    pub fn new(framing: StreamFraming, codec: &BaseCodec) -> Self {
        match framing {
            StreamFraming::Cobs => Self::Cobs(CobsCodec::new(*codec.layout())),
            StreamFraming::Raw => Self::Raw(FrameSync::new(*codec.layout())),
        }
    }
}

impl Codec for StreamCodec {
    fn decode(&mut self, data: &[u8], on_item: impl FnMut(crate::codec::StreamItem)) {
        match self {
            Self::Cobs(c) => c.decode(data, on_item),
            Self::Raw(c) => c.decode(data, on_item),
        }
    }

    fn encode(
        &self,
        id: u8,
        route: Route,
        payload: &[u8],
        output: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        match self {
            Self::Cobs(c) => c.encode(id, route, payload, output),
            Self::Raw(c) => c.encode(id, route, payload, output),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Cobs(c) => c.reset(),
            Self::Raw(c) => c.reset(),
        }
    }
}

/// Handle held by the application side of a TCP connection
pub struct TcpHandle {
    pub outgoing: mpsc::Sender<JsonMessage>,
    pub events: mpsc::Receiver<NetworkEvent>,
    pub connection: Arc<Connection>,
}

/// TCP connection session
pub struct TcpConnection<C: Codec> {
    transport: TransportChannels,
    codec: C,
    connection: Arc<Connection>,
    peer_endpoint: Option<SocketAddr>,
    outgoing: mpsc::Receiver<JsonMessage>,
    events: mpsc::Sender<NetworkEvent>,
    log_tx: Option<mpsc::Sender<LogEntry>>,
}

impl TcpConnection<StreamCodec> {
    /// Connection with the codec and checksum from `config`
    pub fn from_config(
        transport: TransportChannels,
        config: &NetworkConfig,
        peer_endpoint: Option<SocketAddr>,
        log_tx: Option<mpsc::Sender<LogEntry>>,
    ) -> (Self, TcpHandle) {
        let base = BaseCodec::new(BaseVariant::Tcp, config.checksum);
        let codec = StreamCodec::new(config.tcp_framing, &base);
        let connection = Connection::new(Dispatcher::new(base), config.address, log_tx.clone());
        Self::new(transport, codec, connection, peer_endpoint, log_tx)
    }
}

impl<C: Codec> TcpConnection<C> {
    pub fn new(
        transport: TransportChannels,
        codec: C,
        connection: Connection,
        peer_endpoint: Option<SocketAddr>,
        log_tx: Option<mpsc::Sender<LogEntry>>,
    ) -> (Self, TcpHandle) {
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (evt_tx, evt_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let connection = Arc::new(connection);

        let session = Self {
            transport,
            codec,
            connection: connection.clone(),
            peer_endpoint,
            outgoing: out_rx,
            events: evt_tx,
            log_tx,
        };
        let handle = TcpHandle {
            outgoing: out_tx,
            events: evt_rx,
            connection,
        };
        (session, handle)
    }

    /// Run until shutdown, stream close, or the handle is dropped
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) {
        self.connection.set_connected(true);

        loop {
            tokio::select! {
                biased;

                // Periodic shutdown check (every 100ms)
                _ = tokio::time::sleep(Duration::from_millis(100)) => {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                }

                data = self.transport.rx.recv() => {
                    match data {
                        Some(data) => self.handle_incoming(&data),
                        // Stream closed
                        None => break,
                    }
                }

                msg = self.outgoing.recv() => {
                    match msg {
                        Some(msg) => self.handle_outgoing(&msg),
                        None => break,
                    }
                }
            }
        }

        self.connection.set_connected(false);
        info!("TCP connection closed");
        logging::try_log(&self.log_tx, LogEntry::system("TCP connection closed"));
    }

    fn handle_incoming(&mut self, data: &[u8]) {
        if data.is_empty() {
            // Listener switched clients: the old stream's tail is garbage
            debug!("TCP stream restarted, resetting codec");
            self.codec.reset();
            return;
        }

        let connection = &self.connection;
        let events = &self.events;
        let from = self.peer_endpoint;

        self.codec.decode(data, |item| {
            if let Some(event) = connection.receive_item(item, from) {
                if events.try_send(event).is_err() {
                    connection.stats().record_dropped();
                }
            }
        });
    }

    fn handle_outgoing(&mut self, message: &JsonMessage) {
        // Frames go to the address the peer announced in its handshake
        let destination = self.connection.peer().ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED);
        let route = Route::new(self.connection.local(), destination);

        let payload = match message.encode() {
            Ok(p) => p,
            Err(e) => {
                debug!("dropping unencodable message: {}", e);
                return;
            }
        };
        let mut wire = Vec::with_capacity(payload.len() + 32);
        if let Err(e) = self
            .codec
            .encode(JSON_PROTOCOL_ID, route, &payload, &mut wire)
        {
            debug!("dropping message: {}", e);
            return;
        }

        let len = wire.len();
        if self.transport.tx.try_send(Bytes::from(wire)).is_err() {
            self.connection.stats().record_dropped();
            warn!("tcp tx queue full, dropping message");
            return;
        }
        self.connection.stats().record_sent(len);
        let label = message.kind.clone().unwrap_or_else(|| "json".into());
        logging::try_log(&self.log_tx, LogEntry::frame_out(label, len));
    }
}
