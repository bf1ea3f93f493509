//! Serial link to the flight controller
//!
//! The session handles:
//! - Encoding outgoing payloads into serial frames
//! - Resynchronising and decoding incoming frames and status lines
//! - Statistics tracking and event logging
//!
//! `SerialLink` wraps sessions in a reconnection loop: when the port
//! disappears it waits and opens it again until shutdown.

use super::stats::LinkStats;
use crate::codec::{Codec, FrameSync, StreamItem};
use crate::config::SerialConfig;
use crate::constants::{CHANNEL_CAPACITY, RECONNECT_DELAY_SECS};
use crate::error::{CodecError, Result};
use crate::logging::{self, LogEntry, LogLevel};
use crate::registry::{message_name, Payload};
use crate::transport::{SerialTransport, Transport, TransportChannels};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Unit queued for transmission to the flight controller
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Typed payload, sent as one serial frame
    Payload(Payload),
    /// Plain text line (newline appended)
    Text(String),
}

/// Event decoded from the flight controller
#[derive(Debug, Clone, PartialEq)]
pub enum SerialEvent {
    /// Valid frame with a decodable payload
    Message(Payload),
    /// Status line printed by the firmware
    Status {
        level: Option<LogLevel>,
        message: String,
    },
    /// Valid frame whose payload could not be interpreted
    Undecodable { message_type: u8, error: CodecError },
}

/// Why a session returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Shutdown,
    /// Transport closed (port unplugged, read error)
    Disconnected,
    /// Application dropped its command sender
    CommandsClosed,
}

/// Handle held by the application side of a serial link
pub struct SerialHandle {
    pub commands: mpsc::Sender<Outbound>,
    pub events: mpsc::Receiver<SerialEvent>,
    pub stats: Arc<LinkStats>,
}

/// One connected period of a serial port
pub struct SerialSession {
    transport: TransportChannels,
    sync: FrameSync,
    stats: Arc<LinkStats>,
    events: mpsc::Sender<SerialEvent>,
    log_tx: Option<mpsc::Sender<LogEntry>>,
}

impl SerialSession {
    pub fn new(
        transport: TransportChannels,
        stats: Arc<LinkStats>,
        events: mpsc::Sender<SerialEvent>,
        log_tx: Option<mpsc::Sender<LogEntry>>,
    ) -> Self {
        Self {
            transport,
            sync: FrameSync::serial(),
            stats,
            events,
            log_tx,
        }
    }

    /// Run until shutdown, transport disconnect or command channel close
    pub async fn run(
        mut self,
        commands: &mut mpsc::Receiver<Outbound>,
        shutdown: Arc<AtomicBool>,
    ) -> SessionEnd {
        let end = loop {
            tokio::select! {
                biased;

                // Periodic shutdown check (every 100ms)
                _ = tokio::time::sleep(Duration::from_millis(100)) => {
                    if shutdown.load(Ordering::Relaxed) {
                        break SessionEnd::Shutdown;
                    }
                }

                // Device -> Host
                data = self.transport.rx.recv() => {
                    match data {
                        Some(data) => self.handle_incoming(&data),
                        // Channel closed = serial transport disconnected
                        None => break SessionEnd::Disconnected,
                    }
                }

                // Host -> Device
                cmd = commands.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_outgoing(cmd),
                        None => break SessionEnd::CommandsClosed,
                    }
                }
            }
        };

        let discarded = self.sync.discarded_bytes();
        if discarded > 0 {
            debug!("serial session discarded {} bytes", discarded);
        }
        end
    }

    fn handle_incoming(&mut self, data: &[u8]) {
        let stats = &self.stats;
        let events = &self.events;
        let log_tx = &self.log_tx;
        let frame_len = self.sync.layout().frame_len(0);

        self.sync.decode(data, |item| match item {
            StreamItem::Frame { id, payload, .. } => {
                stats.record_received(frame_len);
                logging::try_log(log_tx, LogEntry::frame_in(message_name(id), frame_len));

                let event = match Payload::decode(id, &payload) {
                    Ok(p) => SerialEvent::Message(p),
                    Err(error) => {
                        debug!("undecodable payload for id {}: {}", id, error);
                        SerialEvent::Undecodable {
                            message_type: id,
                            error,
                        }
                    }
                };
                if events.try_send(event).is_err() {
                    stats.record_dropped();
                }
            }
            StreamItem::Status { level, message } => {
                logging::try_log(log_tx, LogEntry::firmware(level, message.clone()));
                if events.try_send(SerialEvent::Status { level, message }).is_err() {
                    stats.record_dropped();
                }
            }
            StreamItem::Rejected(e) => {
                stats.record_error();
                debug!("serial frame rejected: {}", e);
            }
        });
    }

    fn handle_outgoing(&mut self, cmd: Outbound) {
        let (label, bytes) = match cmd {
            Outbound::Payload(payload) => match payload.to_frame() {
                Ok(bytes) => (message_name(payload_id(&payload)), bytes),
                Err(e) => {
                    warn!("cannot encode {:?}: {}", payload, e);
                    return;
                }
            },
            Outbound::Text(mut line) => {
                line.push('\n');
                ("Text".to_string(), line.into_bytes())
            }
        };

        let len = bytes.len();
        if self.transport.tx.try_send(Bytes::from(bytes)).is_err() {
            self.stats.record_dropped();
            warn!("serial tx queue full, dropping {}", label);
            return;
        }
        self.stats.record_sent(len);
        logging::try_log(&self.log_tx, LogEntry::frame_out(label, len));
    }
}

fn payload_id(payload: &Payload) -> u8 {
    payload.message_type().map(|t| t.id()).unwrap_or(u8::MAX)
}

/// Serial link with auto-reconnection
pub struct SerialLink {
    config: SerialConfig,
    stats: Arc<LinkStats>,
    commands: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<SerialEvent>,
    log_tx: Option<mpsc::Sender<LogEntry>>,
}

impl SerialLink {
    pub fn new(
        config: SerialConfig,
        log_tx: Option<mpsc::Sender<LogEntry>>,
    ) -> (Self, SerialHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (evt_tx, evt_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let stats = Arc::new(LinkStats::new());

        let link = Self {
            config,
            stats: stats.clone(),
            commands: cmd_rx,
            events: evt_tx,
            log_tx,
        };
        let handle = SerialHandle {
            commands: cmd_tx,
            events: evt_rx,
            stats,
        };
        (link, handle)
    }

    /// Resolve the port: configured name, or auto-detection by device preset
    fn resolve_port(&self) -> Result<String> {
        if self.config.port.is_empty() {
            SerialTransport::detect(&self.config.device)
        } else {
            Ok(self.config.port.clone())
        }
    }

    /// Run sessions until shutdown, reconnecting when the port is lost
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let retry = Duration::from_secs(RECONNECT_DELAY_SECS);
        let mut announced_wait = false;

        while !shutdown.load(Ordering::Relaxed) {
            let port_name = match self.resolve_port() {
                Ok(p) => p,
                Err(e) => {
                    // Device not found, wait and retry (passive waiting)
                    if !announced_wait {
                        logging::try_log(
                            &self.log_tx,
                            LogEntry::system(format!("Waiting for device: {}", e)),
                        );
                        announced_wait = true;
                    }
                    tokio::time::sleep(retry).await;
                    continue;
                }
            };

            let transport = match SerialTransport::new(&port_name, self.config.baud_rate)
                .spawn(shutdown.clone())
            {
                Ok(t) => t,
                Err(e) => {
                    logging::try_log(
                        &self.log_tx,
                        LogEntry::system(format!("Serial open failed: {}", e)),
                    );
                    tokio::time::sleep(retry).await;
                    continue;
                }
            };
            announced_wait = false;

            info!("serial connected on {} @ {}", port_name, self.config.baud_rate);
            logging::try_log(
                &self.log_tx,
                LogEntry::system(format!(
                    "Connected: {} @ {} baud",
                    port_name, self.config.baud_rate
                )),
            );

            let session = SerialSession::new(
                transport,
                self.stats.clone(),
                self.events.clone(),
                self.log_tx.clone(),
            );
            match session.run(&mut self.commands, shutdown.clone()).await {
                SessionEnd::Shutdown | SessionEnd::CommandsClosed => break,
                SessionEnd::Disconnected if shutdown.load(Ordering::Relaxed) => break,
                SessionEnd::Disconnected => {}
            }

            warn!("serial port {} lost", port_name);
            logging::try_log(
                &self.log_tx,
                LogEntry::system("Connection lost, reconnecting..."),
            );
            tokio::time::sleep(retry).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::frame;
    use crate::logging::LogKind;
    use crate::registry::{Arming, MotorThrust, Setpoint};

    struct Fixture {
        device_tx: mpsc::Sender<Bytes>,
        device_rx: mpsc::Receiver<Bytes>,
        commands: mpsc::Sender<Outbound>,
        events: mpsc::Receiver<SerialEvent>,
        logs: mpsc::Receiver<LogEntry>,
        stats: Arc<LinkStats>,
        shutdown: Arc<AtomicBool>,
        handle: tokio::task::JoinHandle<SessionEnd>,
    }

    fn spawn_session() -> Fixture {
        let (device_tx, link_rx) = mpsc::channel(16);
        let (link_tx, device_rx) = mpsc::channel(16);
        let (evt_tx, events) = mpsc::channel(16);
        let (log_tx, logs) = mpsc::channel(64);
        let (commands, mut cmd_rx) = mpsc::channel(16);
        let stats = Arc::new(LinkStats::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let session = SerialSession::new(
            TransportChannels {
                rx: link_rx,
                tx: link_tx,
            },
            stats.clone(),
            evt_tx,
            Some(log_tx),
        );
        let flag = shutdown.clone();
        let handle = tokio::spawn(async move { session.run(&mut cmd_rx, flag).await });

        Fixture {
            device_tx,
            device_rx,
            commands,
            events,
            logs,
            stats,
            shutdown,
            handle,
        }
    }

    async fn next<T>(rx: &mut mpsc::Receiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_outgoing_payload_framed() {
        let mut fx = spawn_session();
        fx.commands
            .send(Outbound::Payload(Payload::Thrust(MotorThrust::new(
                10.0, 20.0, 30.0, 40.0,
            ))))
            .await
            .unwrap();

        let bytes = next(&mut fx.device_rx).await;
        assert_eq!(bytes.len(), 104);
        assert_eq!(bytes[0], 0xAA);
        assert_eq!(bytes[1], 1);
        assert_eq!(fx.stats.sent(), 1);

        let log = next(&mut fx.logs).await;
        assert!(matches!(log.kind, LogKind::Frame { ref message, size: 104, .. } if message == "Thrust"));

        fx.shutdown.store(true, Ordering::SeqCst);
        assert_eq!(fx.handle.await.unwrap(), SessionEnd::Shutdown);
    }

    #[tokio::test]
    async fn test_outgoing_text_line() {
        let mut fx = spawn_session();
        fx.commands
            .send(Outbound::Text("calib".into()))
            .await
            .unwrap();
        assert_eq!(next(&mut fx.device_rx).await, Bytes::from_static(b"calib\n"));

        fx.shutdown.store(true, Ordering::SeqCst);
        assert_eq!(fx.handle.await.unwrap(), SessionEnd::Shutdown);
    }

    #[tokio::test]
    async fn test_incoming_frames_and_status() {
        let mut fx = spawn_session();

        let mut stream = b"OK: armed\n".to_vec();
        stream.extend(frame::encode(2, &0.5f32.to_le_bytes()).unwrap());
        fx.device_tx.send(Bytes::from(stream)).await.unwrap();

        assert_eq!(
            next(&mut fx.events).await,
            SerialEvent::Status {
                level: Some(LogLevel::Info),
                message: "armed".into()
            }
        );
        assert_eq!(
            next(&mut fx.events).await,
            SerialEvent::Message(Payload::Pitch(Setpoint { value: 0.5 }))
        );
        assert_eq!(fx.stats.received(), 1);

        fx.shutdown.store(true, Ordering::SeqCst);
        assert_eq!(fx.handle.await.unwrap(), SessionEnd::Shutdown);
    }

    #[tokio::test]
    async fn test_corrupt_frame_counted() {
        let mut fx = spawn_session();

        let mut bad = frame::encode(0, &[1]).unwrap();
        bad[103] ^= 0xFF;
        let good = Payload::Arming(Arming { armed: true }).to_frame().unwrap();
        let mut stream = bad;
        stream.extend(good);
        fx.device_tx.send(Bytes::from(stream)).await.unwrap();

        assert_eq!(
            next(&mut fx.events).await,
            SerialEvent::Message(Payload::Arming(Arming { armed: true }))
        );
        assert_eq!(fx.stats.error_packets(), 1);
        assert_eq!(fx.stats.received(), 1);

        fx.shutdown.store(true, Ordering::SeqCst);
        assert_eq!(fx.handle.await.unwrap(), SessionEnd::Shutdown);
    }

    #[tokio::test]
    async fn test_unknown_type_is_undecodable() {
        let mut fx = spawn_session();
        fx.device_tx
            .send(Bytes::from(frame::encode(42, &[1, 2]).unwrap()))
            .await
            .unwrap();

        assert_eq!(
            next(&mut fx.events).await,
            SerialEvent::Undecodable {
                message_type: 42,
                error: CodecError::UnknownMessageType(42)
            }
        );

        fx.shutdown.store(true, Ordering::SeqCst);
        assert_eq!(fx.handle.await.unwrap(), SessionEnd::Shutdown);
    }

    #[tokio::test]
    async fn test_session_ends_on_disconnect() {
        let fx = spawn_session();
        drop(fx.device_tx);
        let end = tokio::time::timeout(Duration::from_secs(1), fx.handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(end, SessionEnd::Disconnected);
    }

    #[tokio::test]
    async fn test_link_stops_on_shutdown_without_device() {
        let config = SerialConfig {
            port: "/dev/does-not-exist-ikarus".into(),
            ..SerialConfig::default()
        };
        let (link, handle) = SerialLink::new(config, None);
        let shutdown = Arc::new(AtomicBool::new(true));
        link.run(shutdown).await.unwrap();
        assert_eq!(handle.stats.sent(), 0);
    }
}
