//! Command-line interface definition using clap
//!
//! Provides structured argument parsing with automatic help generation.

use clap::{ArgGroup, Args, Parser, Subcommand};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Host-side link tool for the IKARUS flight controller and testbed network
#[derive(Parser, Debug)]
#[command(name = "ikarus-link")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: ikarus-link.toml next to the executable)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Serial port overrides shared by the serial subcommands
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialArgs {
    /// Serial port to use (overrides config and auto-detection)
    #[arg(long, value_name = "PORT")]
    pub port: Option<String>,

    /// Baud rate (overrides config)
    #[arg(long, value_name = "BAUD")]
    pub baud: Option<u32>,
}

/// Node overrides shared by the network subcommands
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeArgs {
    /// Address of this node (source field of outgoing frames)
    #[arg(long, value_name = "IPV4")]
    pub address: Option<Ipv4Addr>,

    /// Name announced in handshakes
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports and mark the configured device
    Ports,

    /// Interactive command prompt to the flight controller
    Console {
        #[command(flatten)]
        serial: SerialArgs,
    },

    /// Print decoded telemetry and firmware status lines
    Monitor {
        #[command(flatten)]
        serial: SerialArgs,
    },

    /// Run a UDP node of the testbed network
    Udp {
        /// UDP port (overrides config)
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,

        /// Broadcast a handshake every SECS seconds
        #[arg(long, value_name = "SECS")]
        announce: Option<u64>,

        #[command(flatten)]
        node: NodeArgs,
    },

    /// Open a TCP connection to a testbed device, or accept one
    #[command(group(ArgGroup::new("mode").required(true).args(["connect", "listen"])))]
    Tcp {
        /// Device endpoint to connect to
        #[arg(long, value_name = "ADDR:PORT")]
        connect: Option<SocketAddr>,

        /// Listen on the configured TCP port instead of connecting
        #[arg(long)]
        listen: bool,

        /// TCP port to listen on (overrides config)
        #[arg(long, value_name = "PORT", requires = "listen")]
        port: Option<u16>,

        #[command(flatten)]
        node: NodeArgs,
    },
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_ports() {
        let cli = Cli::parse_from(["ikarus-link", "ports"]);
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
        assert!(matches!(cli.command, Command::Ports));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["ikarus-link"]).is_err());
    }

    #[test]
    fn test_cli_parse_verbose_anywhere() {
        let cli = Cli::parse_from(["ikarus-link", "-v", "ports"]);
        assert!(cli.verbose);

        let cli = Cli::parse_from(["ikarus-link", "monitor", "--verbose"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_parse_console() {
        let cli = Cli::parse_from([
            "ikarus-link",
            "--config",
            "bench.toml",
            "console",
            "--port",
            "/dev/ttyACM0",
            "--baud",
            "921600",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("bench.toml")));
        match cli.command {
            Command::Console { serial } => {
                assert_eq!(serial.port.as_deref(), Some("/dev/ttyACM0"));
                assert_eq!(serial.baud, Some(921_600));
            }
            other => panic!("Expected Console command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_udp() {
        let cli = Cli::parse_from([
            "ikarus-link",
            "udp",
            "--port",
            "37021",
            "--announce",
            "5",
            "--address",
            "192.168.0.10",
        ]);
        match cli.command {
            Command::Udp {
                port,
                announce,
                node,
            } => {
                assert_eq!(port, Some(37021));
                assert_eq!(announce, Some(5));
                assert_eq!(node.address, Some(Ipv4Addr::new(192, 168, 0, 10)));
                assert!(node.name.is_none());
            }
            other => panic!("Expected Udp command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_tcp() {
        let cli = Cli::parse_from(["ikarus-link", "tcp", "--connect", "10.0.0.2:6666"]);
        match cli.command {
            Command::Tcp {
                connect, listen, ..
            } => {
                assert_eq!(connect, Some("10.0.0.2:6666".parse().unwrap()));
                assert!(!listen);
            }
            other => panic!("Expected Tcp command, got {:?}", other),
        }

        let cli = Cli::parse_from(["ikarus-link", "tcp", "--listen", "--port", "7000"]);
        assert!(matches!(
            cli.command,
            Command::Tcp {
                listen: true,
                port: Some(7000),
                ..
            }
        ));
    }

    #[test]
    fn test_cli_tcp_conflicts() {
        assert!(Cli::try_parse_from([
            "ikarus-link",
            "tcp",
            "--listen",
            "--connect",
            "10.0.0.2:6666"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["ikarus-link", "tcp", "--port", "7000"]).is_err());
        // One of --connect / --listen is required
        assert!(Cli::try_parse_from(["ikarus-link", "tcp"]).is_err());
    }
}
