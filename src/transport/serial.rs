//! Serial transport for the flight controller UART
//!
//! Uses blocking threads for low-latency I/O:
//! - Reader thread: reads from serial port, sends to channel
//! - Writer thread: receives from channel, writes to serial port
//!
//! The transport stops when:
//! - `shutdown` flag is set
//! - Serial port disconnects (detected via consecutive empty reads)
//! - Write error occurs

use super::{Transport, TransportChannels};
use crate::config::DeviceConfig;
use crate::constants::{
    CHANNEL_CAPACITY, READ_BUFFER_SIZE, SERIAL_DISCONNECT_THRESHOLD, SERIAL_READ_TIMEOUT_MS,
};
use crate::error::{LinkError, Result};
use bytes::Bytes;
use serialport::{SerialPortInfo, SerialPortType};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Summary of one available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    /// (vid, pid) for USB ports
    pub usb: Option<(u16, u16)>,
    pub product: Option<String>,
}

/// Serial transport
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
}

impl SerialTransport {
    /// Create a new serial transport for the specified port
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// List serial ports of this machine
    pub fn list_ports() -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(|e| LinkError::SerialEnumerate {
            source: std::io::Error::other(e.to_string()),
        })?;

        Ok(ports
            .into_iter()
            .map(|p| match p.port_type {
                SerialPortType::UsbPort(usb) => PortInfo {
                    name: p.port_name,
                    usb: Some((usb.vid, usb.pid)),
                    product: usb.product,
                },
                _ => PortInfo {
                    name: p.port_name,
                    usb: None,
                    product: None,
                },
            })
            .collect())
    }

    /// Detect the flight controller matching the given configuration
    ///
    /// Searches available serial ports for a device matching the VID/PID
    /// specified in the config. Falls back to name pattern matching if
    /// VID/PID info is not available.
    ///
    /// # Errors
    ///
    /// - `NoDeviceFound` - No matching device found
    /// - `MultipleDevicesFound` - More than one matching device found
    pub fn detect(config: &DeviceConfig) -> Result<String> {
        let ports = serialport::available_ports().unwrap_or_default();

        let matching: Vec<_> = ports.iter().filter(|p| matches_device(p, config)).collect();

        match matching.len() {
            0 => Err(LinkError::NoDeviceFound),
            1 => Ok(matching[0].port_name.clone()),
            n => Err(LinkError::MultipleDevicesFound { count: n }),
        }
    }

    /// Open a serial port (8N1, short read timeout)
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Box<dyn serialport::SerialPort>> {
        serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(SERIAL_READ_TIMEOUT_MS))
            .open()
            .map_err(|e| LinkError::SerialOpen {
                port: port_name.to_string(),
                source: std::io::Error::other(e.to_string()),
            })
    }
}

/// Check if a serial port matches the device configuration
fn matches_device(port: &SerialPortInfo, config: &DeviceConfig) -> bool {
    match &port.port_type {
        SerialPortType::UsbPort(usb) => usb.vid == config.vid && config.pid_list.contains(&usb.pid),
        _ => config
            .name_hint
            .current()
            .map(|hint| port.port_name.contains(hint))
            .unwrap_or(false),
    }
}

impl Transport for SerialTransport {
    type Item = Bytes;

    fn spawn(self, shutdown: Arc<AtomicBool>) -> Result<TransportChannels> {
        let (in_tx, in_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);

        let port_read = Self::open(&self.port_name, self.baud_rate)?;
        let port_write = port_read.try_clone().map_err(|e| LinkError::SerialOpen {
            port: self.port_name.clone(),
            source: std::io::Error::other(e.to_string()),
        })?;

        // Reader thread (blocking)
        let shutdown_reader = shutdown.clone();
        let name = self.port_name.clone();
        std::thread::Builder::new()
            .name("serial-rx".into())
            .spawn(move || {
                let mut port = port_read;
                let mut buf = [0u8; READ_BUFFER_SIZE];
                let mut empty_reads = 0u32;

                while !shutdown_reader.load(Ordering::Relaxed) {
                    match port.read(&mut buf) {
                        Ok(n) if n > 0 => {
                            empty_reads = 0;
                            if in_tx
                                .blocking_send(Bytes::copy_from_slice(&buf[..n]))
                                .is_err()
                            {
                                // Receiver dropped
                                break;
                            }
                        }
                        Ok(_) => {
                            // Zero bytes read - could be normal or port gone
                            empty_reads += 1;
                            if empty_reads > SERIAL_DISCONNECT_THRESHOLD {
                                debug!("{}: too many empty reads, closing", name);
                                break;
                            }
                        }
                        Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                            empty_reads = 0;
                        }
                        Err(e) => {
                            debug!("{}: read error: {}", name, e);
                            break;
                        }
                    }
                }
                // Channel closes when in_tx is dropped
            })
            .map_err(|e| LinkError::SerialOpen {
                port: self.port_name.clone(),
                source: e,
            })?;

        // Writer thread (blocking)
        let shutdown_writer = shutdown;
        std::thread::Builder::new()
            .name("serial-tx".into())
            .spawn(move || {
                let mut port = port_write;
                while !shutdown_writer.load(Ordering::Relaxed) {
                    match out_rx.blocking_recv() {
                        Some(data) => {
                            if port.write_all(&data).and_then(|_| port.flush()).is_err() {
                                // Port disconnected
                                break;
                            }
                        }
                        // Sender dropped
                        None => break,
                    }
                }
            })
            .map_err(|e| LinkError::SerialOpen {
                port: self.port_name.clone(),
                source: e,
            })?;

        Ok(TransportChannels {
            rx: in_rx,
            tx: out_tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformNameHint;

    #[test]
    fn test_serial_transport_new() {
        let transport = SerialTransport::new("/dev/ttyUSB0", 115_200);
        assert_eq!(transport.port_name(), "/dev/ttyUSB0");
        assert_eq!(transport.baud_rate, 115_200);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let err = SerialTransport::open("/dev/does-not-exist-ikarus", 115_200).unwrap_err();
        assert!(matches!(err, LinkError::SerialOpen { .. }));
    }

    #[test]
    fn test_matches_device_by_name_hint() {
        let config = DeviceConfig {
            name: "IKARUS".into(),
            vid: 0x0483,
            pid_list: vec![0x374B],
            name_hint: PlatformNameHint {
                windows: Some("ttyACM".into()),
                macos: Some("ttyACM".into()),
                linux: Some("ttyACM".into()),
            },
        };
        let port = SerialPortInfo {
            port_name: "/dev/ttyACM0".into(),
            port_type: SerialPortType::Unknown,
        };
        assert!(matches_device(&port, &config));

        let other = SerialPortInfo {
            port_name: "/dev/ttyS0".into(),
            port_type: SerialPortType::Unknown,
        };
        assert!(!matches_device(&other, &config));
    }
}
