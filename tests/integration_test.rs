//! Integration tests for link sessions
//!
//! Drives the library end to end: console lines through a serial session
//! over a mock transport, and network connections over loopback sockets.

use bytes::Bytes;
use ikarus_link::codec::{frame, BaseCodec};
use ikarus_link::config::{NetworkConfig, StreamFraming};
use ikarus_link::console::{self, ConsoleCommand};
use ikarus_link::link::{
    LinkStats, NetworkEvent, Outbound, SerialEvent, SerialSession, SessionEnd, TcpConnection,
    UdpNode,
};
use ikarus_link::logging::{LogEntry, LogKind, LogLevel};
use ikarus_link::protocol::JsonMessage;
use ikarus_link::registry::{EstimationState, LogData, Payload};
use ikarus_link::transport::{TcpTransport, Transport, TransportChannels};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// =============================================================================
// Mock Transport
// =============================================================================

/// Mock transport for testing sessions without real I/O
pub struct MockTransport {
    /// Chunks delivered to the session (simulates incoming data)
    rx_data: Vec<Bytes>,
    /// Captured data sent by the session
    tx_captured: Arc<tokio::sync::Mutex<Vec<Bytes>>>,
}

impl MockTransport {
    pub fn new(rx_data: Vec<Bytes>) -> Self {
        Self {
            rx_data,
            tx_captured: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn captured(&self) -> Arc<tokio::sync::Mutex<Vec<Bytes>>> {
        self.tx_captured.clone()
    }
}

impl Transport for MockTransport {
    type Item = Bytes;

    fn spawn(self, _shutdown: Arc<AtomicBool>) -> ikarus_link::Result<TransportChannels> {
        let (tx_to_session, rx_from_mock) = mpsc::channel::<Bytes>(16);
        let (tx_from_session, mut rx_to_capture) = mpsc::channel::<Bytes>(16);

        let tx_captured = self.tx_captured.clone();
        tokio::spawn(async move {
            while let Some(data) = rx_to_capture.recv().await {
                tx_captured.lock().await.push(data);
            }
        });

        // Keep the receive side open after the scripted chunks
        let rx_data = self.rx_data;
        tokio::spawn(async move {
            for data in rx_data {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if tx_to_session.send(data).await.is_err() {
                    return;
                }
            }
            tx_to_session.closed().await;
        });

        Ok(TransportChannels {
            rx: rx_from_mock,
            tx: tx_from_session,
        })
    }
}

struct SerialFixture {
    commands: mpsc::Sender<Outbound>,
    events: mpsc::Receiver<SerialEvent>,
    stats: Arc<LinkStats>,
    shutdown: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<SessionEnd>,
}

fn spawn_serial(mock: MockTransport, log_tx: Option<mpsc::Sender<LogEntry>>) -> SerialFixture {
    let shutdown = Arc::new(AtomicBool::new(false));
    let channels = mock.spawn(shutdown.clone()).unwrap();
    let stats = Arc::new(LinkStats::new());
    let (evt_tx, events) = mpsc::channel(64);
    let (commands, mut cmd_rx) = mpsc::channel(64);

    let session = SerialSession::new(channels, stats.clone(), evt_tx, log_tx);
    let shutdown_task = shutdown.clone();
    let task = tokio::spawn(async move { session.run(&mut cmd_rx, shutdown_task).await });

    SerialFixture {
        commands,
        events,
        stats,
        shutdown,
        task,
    }
}

async fn next<T>(rx: &mut mpsc::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timeout")
        .expect("channel closed")
}

// =============================================================================
// Serial link
// =============================================================================

#[tokio::test]
async fn test_console_lines_reach_the_wire_as_frames() {
    let mock = MockTransport::empty();
    let captured = mock.captured();
    let fx = spawn_serial(mock, None);

    for line in ["arming 1", "thrust 0.1 0.2 0.3 0.4", "raw reboot"] {
        match console::parse_line(line).unwrap() {
            Some(ConsoleCommand::Send(outbound)) => fx.commands.send(outbound).await.unwrap(),
            other => panic!("unexpected {:?}", other),
        }
    }
    assert!(console::parse_line("motor 9 1.0").is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let sent = captured.lock().await.clone();
    assert_eq!(sent.len(), 3);

    let arming = frame::decode(&sent[0]).unwrap();
    assert_eq!(sent[0].len(), 104);
    assert!(matches!(
        Payload::from_frame(&arming).unwrap(),
        Payload::Arming(a) if a.armed
    ));

    let thrust = frame::decode(&sent[1]).unwrap();
    assert_eq!(thrust.message_type, 1);
    assert_eq!(thrust.payload.len(), 16);

    assert_eq!(sent[2].as_ref(), b"reboot\n");
    assert_eq!(fx.stats.sent(), 3);

    fx.shutdown.store(true, Ordering::SeqCst);
    assert_eq!(fx.task.await.unwrap(), SessionEnd::Shutdown);
}

#[tokio::test]
async fn test_firmware_stream_with_noise_and_status_lines() {
    let sample = LogData {
        estimation: EstimationState {
            roll: 0.5,
            pitch: -0.25,
            yaw: 1.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let good = Payload::SampleUpdate(sample).to_frame().unwrap();
    let mut corrupt = good.clone();
    corrupt[103] = corrupt[103].wrapping_add(1);

    // Noise, a status line, a corrupt frame, then a good frame split in two
    let mut stream = b"\x01\x02OK: calibrated\n".to_vec();
    stream.extend_from_slice(&corrupt);
    stream.extend_from_slice(&good);
    let split = stream.len() - 40;
    let chunks = vec![
        Bytes::copy_from_slice(&stream[..split]),
        Bytes::copy_from_slice(&stream[split..]),
    ];

    let (log_tx, mut log_rx) = mpsc::channel(64);
    let mut fx = spawn_serial(MockTransport::new(chunks), Some(log_tx));

    assert_eq!(
        next(&mut fx.events).await,
        SerialEvent::Status {
            level: Some(LogLevel::Info),
            message: "calibrated".into()
        }
    );
    assert_eq!(
        next(&mut fx.events).await,
        SerialEvent::Message(Payload::SampleUpdate(sample))
    );
    assert_eq!(fx.stats.received(), 1);
    assert_eq!(fx.stats.error_packets(), 1);

    // Firmware line and the inbound frame are both logged
    let mut kinds = Vec::new();
    while let Ok(entry) = log_rx.try_recv() {
        kinds.push(entry.kind);
    }
    assert!(kinds
        .iter()
        .any(|k| matches!(k, LogKind::Firmware { message, .. } if message == "calibrated")));
    assert!(kinds
        .iter()
        .any(|k| matches!(k, LogKind::Frame { message, size: 104, .. } if message == "SampleUpdate")));

    fx.shutdown.store(true, Ordering::SeqCst);
    fx.task.await.unwrap();
}

// =============================================================================
// Network links
// =============================================================================

fn free_tcp_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn free_udp_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn node_config(address: [u8; 4], framing: StreamFraming) -> NetworkConfig {
    NetworkConfig {
        address: Ipv4Addr::from(address),
        bind: Ipv4Addr::LOCALHOST,
        tcp_framing: framing,
        ..NetworkConfig::default()
    }
}

async fn tcp_handshake_and_reply(framing: StreamFraming) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let port = free_tcp_port();
    let server_cfg = node_config([10, 0, 0, 1], framing);
    let client_cfg = node_config([10, 0, 0, 2], framing);

    let server_channels = TcpTransport::listen(Ipv4Addr::LOCALHOST, port)
        .spawn(shutdown.clone())
        .unwrap();
    let (server, mut server_handle) =
        TcpConnection::from_config(server_channels, &server_cfg, None, None);
    tokio::spawn(server.run(shutdown.clone()));

    let endpoint = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port);
    let client_channels = TcpTransport::connect(endpoint)
        .spawn(shutdown.clone())
        .unwrap();
    let (client, mut client_handle) =
        TcpConnection::from_config(client_channels, &client_cfg, Some(endpoint), None);
    tokio::spawn(client.run(shutdown.clone()));

    // Client announces itself
    let hello = client_handle.connection.handshake("bilbo2");
    client_handle.outgoing.send(hello).await.unwrap();

    match next(&mut server_handle.events).await {
        NetworkEvent::PeerUpdated(peer) => {
            assert_eq!(peer.address.as_deref(), Some("10.0.0.2"));
            assert_eq!(peer.name.as_deref(), Some("bilbo2"));
        }
        other => panic!("unexpected {:?}", other),
    }

    // Server reply is addressed to the announced address
    let reply = JsonMessage::new("response");
    server_handle.outgoing.send(reply.clone()).await.unwrap();
    match next(&mut client_handle.events).await {
        NetworkEvent::Message { route, message, .. } => {
            assert_eq!(route.source, Ipv4Addr::new(10, 0, 0, 1));
            assert_eq!(route.destination, Ipv4Addr::new(10, 0, 0, 2));
            assert_eq!(message, reply);
        }
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(server_handle.connection.stats().received(), 1);
    assert_eq!(client_handle.connection.stats().received(), 1);
    shutdown.store(true, Ordering::SeqCst);
}

#[tokio::test]
async fn test_tcp_cobs_handshake_and_reply() {
    tcp_handshake_and_reply(StreamFraming::Cobs).await;
}

#[tokio::test]
async fn test_tcp_raw_handshake_and_reply() {
    tcp_handshake_and_reply(StreamFraming::Raw).await;
}

#[tokio::test]
async fn test_udp_nodes_exchange_messages() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let port_a = free_udp_port();
    let port_b = free_udp_port();

    let mut cfg_a = node_config([10, 0, 0, 1], StreamFraming::Cobs);
    cfg_a.udp_port = port_a;
    let mut cfg_b = node_config([10, 0, 0, 2], StreamFraming::Cobs);
    cfg_b.udp_port = port_b;

    let node_a = UdpNode::new(&cfg_a, None).spawn(shutdown.clone()).unwrap();
    let mut node_b = UdpNode::new(&cfg_b, None).spawn(shutdown.clone()).unwrap();

    let message = JsonMessage::new("event");
    node_a
        .send_to(&message, SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port_b))
        .unwrap();

    match next(&mut node_b.events).await {
        NetworkEvent::Message {
            route,
            message: received,
            from,
        } => {
            assert_eq!(route.source, Ipv4Addr::new(10, 0, 0, 1));
            assert_eq!(route.destination, Ipv4Addr::LOCALHOST);
            assert_eq!(received, message);
            assert_eq!(from.map(|f| f.port()), Some(port_a));
        }
        other => panic!("unexpected {:?}", other),
    }

    let peer = node_b.connection().peer();
    assert!(peer.last_contact.is_some());
    assert_eq!(node_a.connection().stats().sent(), 1);
    shutdown.store(true, Ordering::SeqCst);
}

#[test]
fn test_checksum_mismatch_between_nodes_is_corruption() {
    use ikarus_link::codec::{BaseVariant, Checksum};
    use ikarus_link::protocol::{Dispatcher, Inbound};

    let sender = Dispatcher::new(BaseCodec::new(BaseVariant::Udp, Checksum::Sum8));
    let receiver = Dispatcher::new(BaseCodec::udp());

    let bytes = sender
        .encode(
            &JsonMessage::new("event"),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::BROADCAST,
        )
        .unwrap();
    assert!(matches!(receiver.decode(&bytes), Inbound::Corrupted(_)));
}

#[tokio::test]
async fn test_tcp_listener_drops_half_frame_of_replaced_client() {
    use ikarus_link::codec::{Codec, CobsCodec, FrameLayout, Route};
    use ikarus_link::protocol::JSON_PROTOCOL_ID;
    use tokio::io::AsyncWriteExt;

    let shutdown = Arc::new(AtomicBool::new(false));
    let port = free_tcp_port();
    let server_cfg = node_config([10, 0, 0, 1], StreamFraming::Cobs);
    let channels = TcpTransport::listen(Ipv4Addr::LOCALHOST, port)
        .spawn(shutdown.clone())
        .unwrap();
    let (server, mut server_handle) =
        TcpConnection::from_config(channels, &server_cfg, None, None);
    tokio::spawn(server.run(shutdown.clone()));

    let codec = CobsCodec::new(FrameLayout::TCP);
    let wire = |kind: &str, source: [u8; 4]| {
        let payload = JsonMessage::new(kind).encode().unwrap();
        let route = Route::new(Ipv4Addr::from(source), Ipv4Addr::new(10, 0, 0, 1));
        let mut out = Vec::new();
        codec
            .encode(JSON_PROTOCOL_ID, route, &payload, &mut out)
            .unwrap();
        out
    };
    let endpoint = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port);

    // First client stops halfway through a frame
    let partial = wire("stream", [10, 0, 0, 2]);
    let mut first = tokio::net::TcpStream::connect(endpoint).await.unwrap();
    first.write_all(&partial[..partial.len() / 2]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Second client takes over and sends a whole frame
    let mut second = tokio::net::TcpStream::connect(endpoint).await.unwrap();
    second.write_all(&wire("write", [10, 0, 0, 3])).await.unwrap();

    match next(&mut server_handle.events).await {
        NetworkEvent::Message { route, message, .. } => {
            assert_eq!(route.source, Ipv4Addr::new(10, 0, 0, 3));
            assert_eq!(message.kind.as_deref(), Some("write"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(server_handle.connection.stats().error_packets(), 0);
    shutdown.store(true, Ordering::SeqCst);
}

#[tokio::test]
async fn test_tcp_raw_framing_carries_large_message() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let port = free_tcp_port();
    let server_cfg = node_config([10, 0, 0, 1], StreamFraming::Raw);
    let client_cfg = node_config([10, 0, 0, 2], StreamFraming::Raw);

    let server_channels = TcpTransport::listen(Ipv4Addr::LOCALHOST, port)
        .spawn(shutdown.clone())
        .unwrap();
    let (server, mut server_handle) =
        TcpConnection::from_config(server_channels, &server_cfg, None, None);
    tokio::spawn(server.run(shutdown.clone()));

    let endpoint = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port);
    let client_channels = TcpTransport::connect(endpoint)
        .spawn(shutdown.clone())
        .unwrap();
    let (client, client_handle) =
        TcpConnection::from_config(client_channels, &client_cfg, Some(endpoint), None);
    tokio::spawn(client.run(shutdown.clone()));

    let mut message = JsonMessage::new("stream");
    message
        .data
        .insert("samples".into(), serde_json::Value::String("x".repeat(6000)));
    client_handle.outgoing.send(message.clone()).await.unwrap();

    match next(&mut server_handle.events).await {
        NetworkEvent::Message { message: received, .. } => assert_eq!(received, message),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(client_handle.connection.stats().sent(), 1);
    assert_eq!(server_handle.connection.stats().error_packets(), 0);
    shutdown.store(true, Ordering::SeqCst);
}
