//! UDP node of the testbed network
//!
//! One broadcast-capable socket per node:
//! - RX task: decodes each datagram as one base frame via `Connection`
//! - Broadcast task: polls the scheduler every tick and sends due broadcasts

use super::broadcast::{Broadcast, BroadcastScheduler};
use super::network::{Connection, NetworkEvent};
use crate::codec::{BaseCodec, BaseVariant};
use crate::config::NetworkConfig;
use crate::constants::CHANNEL_CAPACITY;
use crate::error::{LinkError, Result};
use crate::logging::{self, LogEntry};
use crate::protocol::{Dispatcher, JsonMessage};
use crate::transport::{Datagram, Transport, UdpTransport};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// UDP node before it is started
pub struct UdpNode {
    connection: Arc<Connection>,
    scheduler: Arc<Mutex<BroadcastScheduler>>,
    bind: Ipv4Addr,
    port: u16,
    tick: Duration,
    filter_echo: bool,
    log_tx: Option<mpsc::Sender<LogEntry>>,
}

/// Running UDP node
pub struct UdpNodeHandle {
    connection: Arc<Connection>,
    scheduler: Arc<Mutex<BroadcastScheduler>>,
    port: u16,
    tx: mpsc::Sender<Datagram>,
    log_tx: Option<mpsc::Sender<LogEntry>>,
    /// Delivered messages and peer updates
    pub events: mpsc::Receiver<NetworkEvent>,
}

impl UdpNode {
    pub fn new(config: &NetworkConfig, log_tx: Option<mpsc::Sender<LogEntry>>) -> Self {
        let dispatcher = Dispatcher::new(BaseCodec::new(BaseVariant::Udp, config.checksum));
        Self {
            connection: Arc::new(Connection::new(
                dispatcher,
                config.address,
                log_tx.clone(),
            )),
            scheduler: Arc::new(Mutex::new(BroadcastScheduler::new())),
            bind: config.bind,
            port: config.udp_port,
            tick: Duration::from_millis(config.broadcast_tick_ms.max(1)),
            filter_echo: config.filter_broadcast_echo,
            log_tx,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Start the socket and the broadcast poller
    pub fn spawn(self, shutdown: Arc<AtomicBool>) -> Result<UdpNodeHandle> {
        let channels = UdpTransport::new(self.bind, self.port).spawn(shutdown.clone())?;
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

        info!("UDP node {} on port {}", self.connection.local(), self.port);
        logging::try_log(
            &self.log_tx,
            LogEntry::system(format!(
                "UDP node {} listening on {}:{}",
                self.connection.local(),
                self.bind,
                self.port
            )),
        );
        self.connection.set_connected(true);

        // RX task
        let connection = self.connection.clone();
        let local = IpAddr::V4(self.connection.local());
        let filter_echo = self.filter_echo && !self.connection.local().is_unspecified();
        let mut rx = channels.rx;
        tokio::spawn(async move {
            while let Some(datagram) = rx.recv().await {
                if filter_echo && datagram.peer.ip() == local {
                    continue;
                }
                if let Some(event) = connection.receive(&datagram.payload, Some(datagram.peer)) {
                    if event_tx.try_send(event).is_err() {
                        connection.stats().record_dropped();
                        warn!("udp event queue full, dropping event from {}", datagram.peer);
                    }
                }
            }
            connection.set_connected(false);
        });

        // Broadcast poller task
        let connection = self.connection.clone();
        let scheduler = self.scheduler.clone();
        let tx = channels.tx.clone();
        let tick = self.tick;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            while !shutdown.load(Ordering::Relaxed) {
                interval.tick().await;
                // Drop the lock before sending
                let due = scheduler.lock().poll(Instant::now());
                for broadcast in due {
                    match connection.encode(&broadcast.message, Ipv4Addr::BROADCAST) {
                        Ok(bytes) => {
                            let len = bytes.len();
                            if tx.try_send(Datagram::broadcast(broadcast.port, bytes)).is_ok() {
                                connection.stats().record_sent(len);
                            } else {
                                connection.stats().record_dropped();
                                warn!("udp tx queue full, dropping broadcast");
                            }
                        }
                        Err(e) => debug!("broadcast not encodable: {}", e),
                    }
                }
                if tx.is_closed() {
                    break;
                }
            }
        });

        Ok(UdpNodeHandle {
            connection: self.connection,
            scheduler: self.scheduler,
            port: self.port,
            tx: channels.tx,
            log_tx: self.log_tx,
            events: event_rx,
        })
    }
}

impl UdpNodeHandle {
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Register a periodic broadcast on the node's port
    pub fn add_broadcast(&self, message: JsonMessage, interval: Duration) -> usize {
        self.scheduler
            .lock()
            .add(Broadcast::new(message, self.port, interval))
    }

    /// Send to `target` on the node's port; `None` broadcasts
    pub fn send(&self, message: &JsonMessage, target: Option<Ipv4Addr>) -> Result<()> {
        let target = target.unwrap_or(Ipv4Addr::BROADCAST);
        self.send_to(message, SocketAddr::new(target.into(), self.port))
    }

    /// Send to an explicit endpoint
    ///
    /// Fails with `QueueFull` when the socket task is backed up.
    pub fn send_to(&self, message: &JsonMessage, endpoint: SocketAddr) -> Result<()> {
        let destination = match endpoint.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        };
        let bytes = self.connection.encode(message, destination)?;
        let len = bytes.len();

        if self.tx.try_send(Datagram::new(endpoint, bytes)).is_err() {
            self.connection.stats().record_dropped();
            warn!("udp tx queue full, dropping message to {}", endpoint);
            return Err(LinkError::QueueFull { queue: "udp tx" });
        }
        self.connection.stats().record_sent(len);
        let label = message.kind.clone().unwrap_or_else(|| "json".into());
        logging::try_log(&self.log_tx, LogEntry::frame_out(label, len));
        Ok(())
    }
}
