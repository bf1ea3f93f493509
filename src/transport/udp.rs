//! UDP transport for network communication
//!
//! Binds a broadcast-capable socket. Every received datagram carries the
//! address of its sender, and every outgoing datagram names its target, so
//! one socket serves unicast replies and subnet broadcasts alike.
//!
//! Uses async tokio tasks for I/O:
//! - RX task: receives datagrams, sends them to the channel with their peer
//! - TX task: receives from channel, sends to the datagram's target

use super::{Transport, TransportChannels};
use crate::constants::{
    CHANNEL_CAPACITY, MAX_SOCKET_RETRY_ATTEMPTS, READ_BUFFER_SIZE, RETRY_BASE_DELAY_MS,
};
use crate::error::{LinkError, Result};
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// One datagram and its remote endpoint
///
/// For received datagrams `peer` is the sender; for outgoing ones it is the
/// target (unicast or broadcast address).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub peer: SocketAddr,
    pub payload: Bytes,
}

impl Datagram {
    pub fn new(peer: SocketAddr, payload: impl Into<Bytes>) -> Self {
        Self {
            peer,
            payload: payload.into(),
        }
    }

    /// Datagram for every host of the local subnet on `port`
    pub fn broadcast(port: u16, payload: impl Into<Bytes>) -> Self {
        Self::new(
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port)),
            payload,
        )
    }
}

/// UDP transport for network communication
///
/// # Example
///
/// ```ignore
/// let transport = UdpTransport::new(Ipv4Addr::UNSPECIFIED, 37020);
/// let channels = transport.spawn(shutdown)?;
///
/// // Datagrams from any peer come through channels.rx
/// // Datagrams sent to channels.tx go to their `peer` address
/// ```
pub struct UdpTransport {
    address: Ipv4Addr,
    port: u16,
}

impl UdpTransport {
    /// Create a new UDP transport bound to `address:port`
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Transport for UdpTransport {
    type Item = Datagram;

    fn spawn(self, shutdown: Arc<AtomicBool>) -> Result<TransportChannels<Datagram>> {
        let (in_tx, in_rx) = mpsc::channel::<Datagram>(CHANNEL_CAPACITY);
        let (out_tx, mut out_rx) = mpsc::channel::<Datagram>(CHANNEL_CAPACITY);

        // Create socket with SO_REUSEADDR for quick rebind
        let socket = create_broadcast_udp_socket(SocketAddrV4::new(self.address, self.port))?;

        // RX task (async)
        let socket_rx = socket.clone();
        let shutdown_rx = shutdown.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];

            while !shutdown_rx.load(Ordering::Relaxed) {
                match tokio::time::timeout(
                    Duration::from_millis(100),
                    socket_rx.recv_from(&mut buf),
                )
                .await
                {
                    Ok(Ok((len, peer))) => {
                        let datagram = Datagram::new(peer, Bytes::copy_from_slice(&buf[..len]));
                        if in_tx.send(datagram).await.is_err() {
                            // Channel closed
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        // Socket recv error - continue polling
                        trace!("udp recv error: {}", e);
                    }
                    Err(_) => {
                        // Timeout - expected, allows checking shutdown flag
                    }
                }
            }
        });

        // TX task (async)
        let socket_tx = socket;
        let shutdown_tx = shutdown;
        tokio::spawn(async move {
            while !shutdown_tx.load(Ordering::Relaxed) {
                match tokio::time::timeout(Duration::from_millis(100), out_rx.recv()).await {
                    Ok(Some(datagram)) => {
                        if let Err(e) = socket_tx.send_to(&datagram.payload, datagram.peer).await {
                            debug!("udp send to {} failed: {}", datagram.peer, e);
                        }
                    }
                    Ok(None) => {
                        // Channel closed
                        break;
                    }
                    Err(_) => {
                        // Timeout - check shutdown flag
                    }
                }
            }
        });

        Ok(TransportChannels {
            rx: in_rx,
            tx: out_tx,
        })
    }
}

/// Create a broadcast-enabled UDP socket with SO_REUSEADDR
///
/// Retries a few times if the address is still in use (e.g., from previous run).
fn create_broadcast_udp_socket(addr: SocketAddrV4) -> Result<Arc<UdpSocket>> {
    let port = addr.port();
    let map_err = |e| LinkError::UdpBind { port, source: e };

    // Try up to MAX_SOCKET_RETRY_ATTEMPTS times with increasing delay
    for attempt in 0..MAX_SOCKET_RETRY_ATTEMPTS {
        let socket =
            Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(map_err)?;
        socket.set_reuse_address(true).map_err(map_err)?;
        socket.set_broadcast(true).map_err(map_err)?;
        socket.set_nonblocking(true).map_err(map_err)?;

        match socket.bind(&SocketAddr::V4(addr).into()) {
            Ok(_) => {
                let std_socket: std::net::UdpSocket = socket.into();
                let tokio_socket = UdpSocket::from_std(std_socket).map_err(map_err)?;
                return Ok(Arc::new(tokio_socket));
            }
            Err(_) if attempt < MAX_SOCKET_RETRY_ATTEMPTS - 1 => {
                // Exponential backoff: 200ms, 400ms, 800ms, 1600ms
                std::thread::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * (1 << attempt)));
            }
            Err(e) => return Err(map_err(e)),
        }
    }

    Err(LinkError::UdpBind {
        port,
        source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "failed after retries"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udp_transport_new() {
        let transport = UdpTransport::new(Ipv4Addr::UNSPECIFIED, 37020);
        assert_eq!(transport.port(), 37020);
    }

    #[test]
    fn test_broadcast_datagram_target() {
        let d = Datagram::broadcast(37020, Bytes::from_static(b"x"));
        assert_eq!(d.peer, "255.255.255.255:37020".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_loopback_exchange() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut a = UdpTransport::new(Ipv4Addr::LOCALHOST, 0)
            .spawn(shutdown.clone())
            .unwrap();

        let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let remote_addr = remote.local_addr().unwrap();

        a.tx
            .send(Datagram::new(remote_addr, Bytes::from_static(b"ping")))
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = tokio::time::timeout(Duration::from_secs(2), remote.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"ping");

        remote.send_to(b"pong", from).await.unwrap();
        let got = tokio::time::timeout(Duration::from_secs(2), a.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.payload, Bytes::from_static(b"pong"));
        assert_eq!(got.peer, remote_addr);

        shutdown.store(true, Ordering::Relaxed);
    }
}
