//! Configuration management
//!
//! Config file is stored next to the executable as `ikarus-link.toml`,
//! or passed explicitly with `--config`.

use crate::codec::Checksum;
use crate::constants::{BROADCAST_TICK_MS, DEFAULT_BAUD_RATE, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File name of the config next to the executable
pub const CONFIG_FILE_NAME: &str = "ikarus-link.toml";

// =============================================================================
// Device Configuration
// =============================================================================

/// USB device detection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Display name for the device
    pub name: String,
    /// USB Vendor ID
    pub vid: u16,
    /// List of accepted USB Product IDs
    pub pid_list: Vec<u16>,
    /// Platform-specific port name hints (optional)
    pub name_hint: PlatformNameHint,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        // ST-LINK virtual COM port of the flight controller board
        Self {
            name: "IKARUS FC".to_string(),
            vid: 0x0483,
            pid_list: vec![0x374B, 0x374E, 0x5740],
            name_hint: PlatformNameHint {
                windows: None,
                macos: Some("usbmodem".to_string()),
                linux: Some("ttyACM".to_string()),
            },
        }
    }
}

/// Platform-specific port name hints for device detection fallback
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformNameHint {
    /// Windows port name pattern (e.g., "COM")
    pub windows: Option<String>,
    /// macOS port name pattern (e.g., "usbmodem")
    pub macos: Option<String>,
    /// Linux port name pattern (e.g., "ttyACM")
    pub linux: Option<String>,
}

impl PlatformNameHint {
    /// Returns the hint for the current platform
    pub fn current(&self) -> Option<&str> {
        #[cfg(windows)]
        {
            self.windows.as_deref()
        }
        #[cfg(target_os = "macos")]
        {
            self.macos.as_deref()
        }
        #[cfg(target_os = "linux")]
        {
            self.linux.as_deref()
        }
        #[cfg(not(any(windows, target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub network: NetworkConfig,
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial port name (empty = auto-detect using `device`)
    pub port: String,
    pub baud_rate: u32,
    pub device: DeviceConfig,
}

/// How base frames are delimited on a TCP stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamFraming {
    /// COBS blocks terminated by 0x00
    #[default]
    Cobs,
    /// Back-to-back frames, resynchronised on the header
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address written into the source field of outgoing frames
    pub address: Ipv4Addr,
    /// Name announced in handshakes
    pub name: String,
    /// Local address the sockets bind to
    pub bind: Ipv4Addr,
    pub udp_port: u16,
    pub tcp_port: u16,
    /// Checksum of UDP/TCP base frames
    pub checksum: Checksum,
    pub tcp_framing: StreamFraming,
    /// Poll tick of the broadcast scheduler (milliseconds)
    pub broadcast_tick_ms: u64,
    /// Ignore datagrams whose sender is this node's own address
    pub filter_broadcast_echo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Log file path (unset = no file logging)
    pub file: Option<PathBuf>,
    /// Size at which the file is rotated
    pub max_bytes: u64,
    /// Number of rotated files kept
    pub max_files: usize,
    pub include_frames: bool,
    pub include_firmware: bool,
    pub include_system: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            device: DeviceConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: Ipv4Addr::UNSPECIFIED,
            name: "ikarus-link".to_string(),
            bind: Ipv4Addr::UNSPECIFIED,
            udp_port: DEFAULT_UDP_PORT,
            tcp_port: DEFAULT_TCP_PORT,
            checksum: Checksum::default(),
            tcp_framing: StreamFraming::default(),
            broadcast_tick_ms: BROADCAST_TICK_MS,
            filter_broadcast_echo: true,
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            file: None,
            max_bytes: 5 * 1024 * 1024,
            max_files: 3,
            include_frames: false,
            include_firmware: true,
            include_system: true,
        }
    }
}

impl Config {
    /// Reject values no link can run with
    pub fn validate(&self) -> Result<()> {
        if self.serial.baud_rate == 0 {
            return Err(LinkError::ConfigValidation {
                field: "serial.baud_rate",
                reason: "must be greater than 0".into(),
            });
        }
        if self.network.broadcast_tick_ms == 0 {
            return Err(LinkError::ConfigValidation {
                field: "network.broadcast_tick_ms",
                reason: "must be greater than 0".into(),
            });
        }
        if self.network.name.is_empty() {
            return Err(LinkError::ConfigValidation {
                field: "network.name",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Get the default config file path (next to the executable)
pub fn config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| LinkError::ConfigRead {
        path: PathBuf::from("executable"),
        source: e,
    })?;
    let exe_dir = exe.parent().ok_or_else(|| LinkError::ConfigValidation {
        field: "exe_path",
        reason: "no parent directory".into(),
    })?;
    Ok(exe_dir.join(CONFIG_FILE_NAME))
}

/// Load config from `path`, or the default path
///
/// A missing, unreadable or invalid file falls back to defaults with a warning.
pub fn load(path: Option<&Path>) -> Config {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match config_path() {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to determine config path: {}, using defaults", e);
                return Config::default();
            }
        },
    };

    if !path.exists() {
        return Config::default();
    }

    match read(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, using defaults", e);
            Config::default()
        }
    }
}

/// Read and validate a config file
pub fn read(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| LinkError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: Config = toml::from_str(&content).map_err(|e| LinkError::ConfigValidation {
        field: "toml",
        reason: format!("{}: {}", path.display(), e),
    })?;
    config.validate()?;
    Ok(config)
}

/// Save config to `path`
pub fn save(config: &Config, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).map_err(|e| LinkError::ConfigValidation {
        field: "toml",
        reason: e.to_string(),
    })?;
    fs::write(path, content).map_err(|e| LinkError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Detect serial port from config (explicit port or auto-detection via device preset)
pub fn detect_serial(cfg: &Config) -> Option<String> {
    use crate::transport::SerialTransport;

    // If port is explicitly configured, use it
    if !cfg.serial.port.is_empty() {
        return Some(cfg.serial.port.clone());
    }

    SerialTransport::detect(&cfg.serial.device).ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.serial.port, "");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.network.udp_port, 37020);
        assert_eq!(config.network.tcp_port, 6666);
        assert_eq!(config.network.checksum, Checksum::Crc8);
        assert_eq!(config.network.tcp_framing, StreamFraming::Cobs);
        assert_eq!(config.network.broadcast_tick_ms, 10);
        assert!(config.logs.file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_partial_sections() {
        let partial_toml = r#"
[serial]
port = "/dev/ttyACM0"

[network]
address = "192.168.0.10"
checksum = "sum8"
tcp_framing = "raw"

[serial.device]
vid = 1155
"#;

        let config: Config = toml::from_str(partial_toml).unwrap();

        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.serial.device.vid, 1155);
        assert_eq!(
            config.serial.device.pid_list,
            DeviceConfig::default().pid_list
        );
        assert_eq!(config.network.address, Ipv4Addr::new(192, 168, 0, 10));
        assert_eq!(config.network.checksum, Checksum::Sum8);
        assert_eq!(config.network.tcp_framing, StreamFraming::Raw);
        assert_eq!(config.network.udp_port, DEFAULT_UDP_PORT);
    }

    #[test]
    fn test_config_serialize_deserialize_roundtrip() {
        let mut config = Config::default();
        config.serial.port = "COM3".into();
        config.serial.baud_rate = 921_600;
        config.network.name = "groundstation".into();
        config.network.checksum = Checksum::None;
        config.logs.file = Some(PathBuf::from("logs/link.log"));
        config.logs.include_frames = true;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_validate_rejects_zero_baud() {
        let mut config = Config::default();
        config.serial.baud_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(LinkError::ConfigValidation {
                field: "serial.baud_rate",
                ..
            })
        ));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("ikarus-link-does-not-exist.toml");
        assert_eq!(load(Some(&path)), Config::default());
    }

    #[test]
    fn test_save_and_read() {
        let path = std::env::temp_dir().join(format!(
            "ikarus-link-test-{}.toml",
            std::process::id()
        ));
        let mut config = Config::default();
        config.network.udp_port = 40000;

        save(&config, &path).unwrap();
        assert_eq!(read(&path).unwrap(), config);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let path = std::env::temp_dir().join(format!(
            "ikarus-link-invalid-{}.toml",
            std::process::id()
        ));
        fs::write(&path, "[serial]\nbaud_rate = \"fast\"\n").unwrap();
        assert!(read(&path).is_err());
        assert_eq!(load(Some(&path)), Config::default());
        let _ = fs::remove_file(&path);
    }
}
