//! IKARUS link - host-side tool for the IKARUS flight controller
//!
//! Usage:
//!   ikarus-link ports                 List serial ports
//!   ikarus-link console               Interactive prompt to the flight controller
//!   ikarus-link monitor               Print telemetry and status lines
//!   ikarus-link udp [--announce S]    Run a UDP node of the testbed network
//!   ikarus-link tcp --connect A:P     TCP connection to a testbed device

use clap::Parser;
use ikarus_link::cli::{Cli, Command, NodeArgs, SerialArgs};
use ikarus_link::config::{self, Config, NetworkConfig};
use ikarus_link::console::{self, ConsoleCommand, HELP};
use ikarus_link::constants::CHANNEL_CAPACITY;
use ikarus_link::link::{
    LinkStats, NetworkEvent, SerialEvent, SerialHandle, SerialLink, TcpConnection, UdpNode,
};
use ikarus_link::logging::{self, file, LogEntry, LogKind};
use ikarus_link::protocol::JsonMessage;
use ikarus_link::registry::{self, Payload};
use ikarus_link::transport::{SerialTransport, TcpMode, TcpTransport, Transport};
use ikarus_link::{LinkError, Result};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let config = config::load(cli.config.as_deref());

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(source) => {
            eprintln!("{}", LinkError::Runtime { source });
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, mut config: Config) -> Result<()> {
    if let Command::Ports = cli.command {
        return list_ports(&config);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_shutdown_handler(shutdown.clone());
    let log_tx = spawn_log_printer(&config, cli.verbose);

    match cli.command {
        Command::Ports => Ok(()),
        Command::Console { serial } => {
            apply_serial_args(&mut config, serial);
            run_console(config, shutdown, log_tx).await
        }
        Command::Monitor { serial } => {
            apply_serial_args(&mut config, serial);
            run_monitor(config, shutdown, log_tx).await
        }
        Command::Udp {
            port,
            announce,
            node,
        } => {
            apply_node_args(&mut config.network, node);
            if let Some(port) = port {
                config.network.udp_port = port;
            }
            run_udp(config.network, announce, shutdown, log_tx).await
        }
        Command::Tcp {
            connect,
            listen,
            port,
            node,
        } => {
            apply_node_args(&mut config.network, node);
            if let Some(port) = port {
                config.network.tcp_port = port;
            }
            let mode = match connect {
                Some(addr) if !listen => TcpMode::Connect(addr),
                _ => TcpMode::Listen {
                    address: config.network.bind,
                    port: config.network.tcp_port,
                },
            };
            run_tcp(config.network, mode, shutdown, log_tx).await
        }
    }
}

fn apply_serial_args(config: &mut Config, args: SerialArgs) {
    if let Some(port) = args.port {
        config.serial.port = port;
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
}

fn apply_node_args(network: &mut NetworkConfig, args: NodeArgs) {
    if let Some(address) = args.address {
        network.address = address;
    }
    if let Some(name) = args.name {
        network.name = name;
    }
}

// ============================================================================
// Shared plumbing
// ============================================================================

fn spawn_shutdown_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => {},
                        _ = tokio::signal::ctrl_c() => {},
                    }
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        shutdown.store(true, Ordering::SeqCst);
    });
}

/// Print link log entries to stderr and forward them to the log file
fn spawn_log_printer(config: &Config, verbose: bool) -> Option<mpsc::Sender<LogEntry>> {
    let file_logger = match file::FileLoggerConfig::from_logs(&config.logs) {
        Some(cfg) => match file::spawn_file_logger(cfg) {
            Ok(logger) => Some(logger),
            Err(e) => {
                eprintln!("File logging disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let (tx, mut rx) = mpsc::channel::<LogEntry>(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            if let Some(logger) = &file_logger {
                logger.log(&entry);
            }
            // Firmware lines are printed by the event loops
            let show = match entry.kind {
                LogKind::System { .. } => true,
                LogKind::Frame { .. } => verbose,
                LogKind::Firmware { .. } => false,
            };
            if show {
                eprintln!("{}", entry);
            }
        }
    });
    Some(tx)
}

fn print_stats(stats: &LinkStats) {
    let (tx_rate, rx_rate) = stats.update_rates();
    println!(
        "{} | tx {:.0} B/s, rx {:.0} B/s",
        stats.snapshot(),
        tx_rate,
        rx_rate
    );
}

/// Payload as `Name field=value ...`
fn describe_payload(payload: &Payload) -> String {
    let described = payload
        .encode()
        .and_then(|(id, bytes)| Ok((id, registry::describe(id, &bytes)?)));
    match described {
        Ok((id, fields)) => {
            let mut line = registry::message_name(id);
            for (name, value) in fields {
                line.push_str(&format!(" {}={}", name, value));
            }
            line
        }
        Err(_) => format!("{:?}", payload),
    }
}

fn print_serial_event(event: &SerialEvent) {
    match event {
        SerialEvent::Message(payload) => println!("<- {}", describe_payload(payload)),
        SerialEvent::Status { level, message } => {
            println!("{}", LogEntry::firmware(*level, message.clone()))
        }
        SerialEvent::Undecodable {
            message_type,
            error,
        } => println!(
            "<- {} (undecodable: {})",
            registry::message_name(*message_type),
            error
        ),
    }
}

fn print_network_event(event: &NetworkEvent) {
    match event {
        NetworkEvent::Message {
            route,
            message,
            from,
        } => {
            let body = serde_json::to_string(message).unwrap_or_default();
            match from {
                Some(from) => println!("<- {} via {}: {}", route, from, body),
                None => println!("<- {}: {}", route, body),
            }
        }
        NetworkEvent::PeerUpdated(peer) => println!(
            "peer {} ({})",
            peer.address.as_deref().unwrap_or("?"),
            peer.name.as_deref().unwrap_or("unnamed")
        ),
    }
}

// ============================================================================
// Subcommands
// ============================================================================

fn list_ports(config: &Config) -> Result<()> {
    let ports = SerialTransport::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    let device = &config.serial.device;
    for port in ports {
        let is_device = port.name == config.serial.port
            || port
                .usb
                .map(|(vid, pid)| vid == device.vid && device.pid_list.contains(&pid))
                .unwrap_or(false);
        let marker = if is_device { "*" } else { " " };
        match port.usb {
            Some((vid, pid)) => println!(
                "{} {:<24} {:04X}:{:04X} {}",
                marker,
                port.name,
                vid,
                pid,
                port.product.as_deref().unwrap_or("")
            ),
            None => println!("{} {}", marker, port.name),
        }
    }

    match config::detect_serial(config) {
        Some(port) => println!("{} port: {}", device.name, port),
        None => println!("{} not detected", device.name),
    }
    Ok(())
}

fn start_serial(
    config: &Config,
    shutdown: &Arc<AtomicBool>,
    log_tx: Option<mpsc::Sender<LogEntry>>,
) -> SerialHandle {
    let (link, handle) = SerialLink::new(config.serial.clone(), log_tx);
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = link.run(shutdown).await {
            eprintln!("Serial link stopped: {}", e);
        }
    });
    handle
}

async fn run_monitor(
    config: Config,
    shutdown: Arc<AtomicBool>,
    log_tx: Option<mpsc::Sender<LogEntry>>,
) -> Result<()> {
    let mut handle = start_serial(&config, &shutdown, log_tx);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
            event = handle.events.recv() => match event {
                Some(event) => print_serial_event(&event),
                None => break,
            }
        }
    }

    println!("{}", handle.stats.snapshot());
    Ok(())
}

async fn run_console(
    config: Config,
    shutdown: Arc<AtomicBool>,
    log_tx: Option<mpsc::Sender<LogEntry>>,
) -> Result<()> {
    let mut handle = start_serial(&config, &shutdown, log_tx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type 'help' for commands");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
            event = handle.events.recv() => match event {
                Some(event) => print_serial_event(&event),
                None => break,
            },
            line = lines.next_line() => {
                let line = match line.map_err(|source| LinkError::Stdin { source })? {
                    Some(line) => line,
                    // EOF
                    None => break,
                };
                match console::parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(ConsoleCommand::Help)) => println!("{}", HELP),
                    Ok(Some(ConsoleCommand::Stats)) => print_stats(&handle.stats),
                    Ok(Some(ConsoleCommand::Send(outbound))) => {
                        if handle.commands.try_send(outbound).is_err() {
                            eprintln!("Link busy, command dropped");
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    Ok(())
}

async fn run_udp(
    network: NetworkConfig,
    announce: Option<u64>,
    shutdown: Arc<AtomicBool>,
    log_tx: Option<mpsc::Sender<LogEntry>>,
) -> Result<()> {
    let name = network.name.clone();
    let mut node = UdpNode::new(&network, log_tx).spawn(shutdown.clone())?;
    let handshake = node.connection().handshake(&name);

    if let Some(secs) = announce {
        node.add_broadcast(handshake.clone(), Duration::from_secs(secs.max(1)));
    }

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
            event = node.events.recv() => match event {
                Some(event) => {
                    print_network_event(&event);
                    // Answer handshakes so the peer learns this node
                    if let NetworkEvent::PeerUpdated(peer) = &event {
                        if let Some(endpoint) = peer.endpoint {
                            if let Err(e) = node.send_to(&handshake, endpoint) {
                                eprintln!("Handshake reply failed: {}", e);
                            }
                        }
                    }
                }
                None => break,
            }
        }
    }

    println!("{}", node.connection().stats().snapshot());
    Ok(())
}

async fn run_tcp(
    network: NetworkConfig,
    mode: TcpMode,
    shutdown: Arc<AtomicBool>,
    log_tx: Option<mpsc::Sender<LogEntry>>,
) -> Result<()> {
    let connect = match mode {
        TcpMode::Connect(addr) => Some(addr),
        TcpMode::Listen { .. } => None,
    };
    let channels = TcpTransport::new(mode).spawn(shutdown.clone())?;
    let (session, mut handle) =
        TcpConnection::from_config(channels, &network, connect, log_tx);
    let session = tokio::spawn(session.run(shutdown.clone()));

    let handshake = handle.connection.handshake(&network.name);
    if connect.is_some() && handle.outgoing.send(handshake).await.is_err() {
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
            event = handle.events.recv() => match event {
                Some(event) => print_network_event(&event),
                None => break,
            },
            line = lines.next_line() => {
                let line = match line.map_err(|source| LinkError::Stdin { source })? {
                    Some(line) => line,
                    None => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                // Each input line is one JSON message
                match serde_json::from_str::<JsonMessage>(&line) {
                    Ok(message) => {
                        if handle.outgoing.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("Invalid JSON message: {}", e),
                }
            }
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    let _ = session.await;
    println!("{}", handle.connection.stats().snapshot());
    Ok(())
}
