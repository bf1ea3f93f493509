//! TCP transport for the device server stream
//!
//! Two modes:
//! - `Listen`: accepts connections, one client at a time. A new client closes
//!   the previous one, and `STREAM_RESTART` separates their bytes on `rx`.
//! - `Connect`: dials a single peer; the channels close when it hangs up
//!
//! The stream carries raw bytes; frame boundaries are the codec's concern.

use super::{Transport, TransportChannels};
use crate::constants::{
    CHANNEL_CAPACITY, READ_BUFFER_SIZE, TCP_CONNECT_TIMEOUT_MS, TCP_LISTEN_BACKLOG,
};
use crate::error::{LinkError, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Empty chunk on `rx`: the bytes that follow come from a new client
pub const STREAM_RESTART: Bytes = Bytes::new();

/// How the TCP transport obtains its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpMode {
    Listen { address: Ipv4Addr, port: u16 },
    Connect(SocketAddr),
}

/// TCP transport
pub struct TcpTransport {
    mode: TcpMode,
}

impl TcpTransport {
    pub fn new(mode: TcpMode) -> Self {
        Self { mode }
    }

    pub fn listen(address: Ipv4Addr, port: u16) -> Self {
        Self::new(TcpMode::Listen { address, port })
    }

    pub fn connect(addr: SocketAddr) -> Self {
        Self::new(TcpMode::Connect(addr))
    }

    pub fn mode(&self) -> TcpMode {
        self.mode
    }
}

impl Transport for TcpTransport {
    type Item = Bytes;

    fn spawn(self, shutdown: Arc<AtomicBool>) -> Result<TransportChannels> {
        let (in_tx, in_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);

        match self.mode {
            TcpMode::Listen { address, port } => {
                let listener = create_reusable_listener(SocketAddrV4::new(address, port))?;
                info!("TCP server listening on {}:{}", address, port);
                tokio::spawn(run_listener(listener, in_tx, out_rx, shutdown));
            }
            TcpMode::Connect(addr) => {
                let stream = connect(addr)?;
                info!("TCP connected to {}", addr);
                tokio::spawn(async move {
                    handle_client(stream, addr, in_tx, out_rx, shutdown).await;
                    info!("TCP peer {} disconnected", addr);
                });
            }
        }

        Ok(TransportChannels {
            rx: in_rx,
            tx: out_tx,
        })
    }
}

/// Bind a listening socket with SO_REUSEADDR
fn create_reusable_listener(addr: SocketAddrV4) -> Result<TcpListener> {
    let port = addr.port();
    let map_err = |e| LinkError::TcpBind { port, source: e };

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(map_err)?;
    socket.set_reuse_address(true).map_err(map_err)?;
    socket.set_nonblocking(true).map_err(map_err)?;
    socket
        .bind(&SocketAddr::V4(addr).into())
        .map_err(map_err)?;
    socket.listen(TCP_LISTEN_BACKLOG).map_err(map_err)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener).map_err(map_err)
}

/// Dial `addr` with a bounded timeout
fn connect(addr: SocketAddr) -> Result<TcpStream> {
    let map_err = |e| LinkError::TcpConnect { addr, source: e };

    let stream =
        std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(TCP_CONNECT_TIMEOUT_MS))
            .map_err(map_err)?;
    stream.set_nodelay(true).map_err(map_err)?;
    stream.set_nonblocking(true).map_err(map_err)?;
    TcpStream::from_std(stream).map_err(map_err)
}

/// Accept loop: the newest client owns the stream in both directions
async fn run_listener(
    listener: TcpListener,
    in_tx: mpsc::Sender<Bytes>,
    mut out_rx: mpsc::Receiver<Bytes>,
    shutdown: Arc<AtomicBool>,
) {
    // Sender of the active client, tagged with its connection number
    let client_tx: Arc<RwLock<Option<(u64, mpsc::Sender<Bytes>)>>> = Arc::new(RwLock::new(None));
    let next_client = AtomicU64::new(0);
    let mut active: Option<JoinHandle<()>> = None;

    // TX forwarder task: forwards outgoing data to the connected client
    let client_tx_fwd = client_tx.clone();
    let shutdown_fwd = shutdown.clone();
    tokio::spawn(async move {
        while !shutdown_fwd.load(Ordering::Relaxed) {
            match tokio::time::timeout(Duration::from_millis(100), out_rx.recv()).await {
                Ok(Some(data)) => {
                    // Clone sender (drop lock before await)
                    let sender = client_tx_fwd.read().clone();
                    match sender {
                        Some((_, tx)) => {
                            let _ = tx.send(data).await;
                        }
                        None => debug!("no TCP client, dropping {} bytes", data.len()),
                    }
                }
                Ok(None) => break, // Channel closed
                Err(_) => {}       // Timeout, continue
            }
        }
    });

    while !shutdown.load(Ordering::Relaxed) {
        match tokio::time::timeout(Duration::from_millis(100), listener.accept()).await {
            Ok(Ok((stream, addr))) => {
                info!("TCP client connected: {}", addr);
                let _ = stream.set_nodelay(true);

                // One reader at a time: close the previous client first
                if let Some(previous) = active.take() {
                    previous.abort();
                    let _ = previous.await;
                    debug!("previous TCP client closed for {}", addr);
                }
                if in_tx.send(STREAM_RESTART).await.is_err() {
                    break;
                }

                let id = next_client.fetch_add(1, Ordering::Relaxed);
                let (client_out_tx, client_out_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
                *client_tx.write() = Some((id, client_out_tx));

                let in_tx = in_tx.clone();
                let shutdown = shutdown.clone();
                let client_tx_ref = client_tx.clone();
                active = Some(tokio::spawn(async move {
                    handle_client(stream, addr, in_tx, client_out_rx, shutdown).await;
                    info!("TCP client disconnected: {}", addr);

                    // Clear the sender only if no newer client replaced it
                    let mut guard = client_tx_ref.write();
                    if matches!(*guard, Some((current, _)) if current == id) {
                        *guard = None;
                    }
                }));
            }
            Ok(Err(e)) => {
                warn!("Failed to accept TCP connection: {}", e);
            }
            Err(_) => {} // Timeout, check shutdown flag
        }
    }
}

/// Pump bytes between one TCP stream and the channels until either side stops
///
/// Both directions run inside the calling task, so aborting it closes the
/// socket.
async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    in_tx: mpsc::Sender<Bytes>,
    mut out_rx: mpsc::Receiver<Bytes>,
    shutdown: Arc<AtomicBool>,
) {
    let (mut reader, mut writer) = stream.into_split();

    // RX: stream -> channel
    let shutdown_rx = shutdown.clone();
    let rx = async move {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        while !shutdown_rx.load(Ordering::Relaxed) {
            match tokio::time::timeout(Duration::from_millis(100), reader.read(&mut buf)).await {
                Ok(Ok(0)) => break, // Connection closed
                Ok(Ok(n)) => {
                    if in_tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                        break; // Channel closed
                    }
                }
                Ok(Err(e)) => {
                    debug!("TCP {} read error: {}", addr, e);
                    break;
                }
                Err(_) => {} // Timeout
            }
        }
    };

    // TX: channel -> stream
    let tx = async move {
        while !shutdown.load(Ordering::Relaxed) {
            match tokio::time::timeout(Duration::from_millis(100), out_rx.recv()).await {
                Ok(Some(data)) => {
                    if writer.write_all(&data).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break, // Channel closed
                Err(_) => {}       // Timeout
            }
        }
        let _ = writer.shutdown().await;
    };

    // Either direction finishing drops the other
    tokio::select! {
        _ = rx => {}
        _ = tx => {}
    }
}
