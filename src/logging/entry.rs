//! Log entry types
//!
//! Core types for representing events of a link (frames, firmware text,
//! link state).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a firmware status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Direction of frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    In,  // Device -> Host
    Out, // Host -> Device
}

/// Type of log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogKind {
    /// Frame sent or received (message name from the registry)
    Frame {
        direction: Direction,
        message: String,
        size: usize,
    },
    /// Text line from the firmware (`OK: ...`, `ERR: ...`)
    Firmware {
        level: Option<LogLevel>,
        message: String,
    },
    /// Message from the link itself
    System { message: String },
}

/// Log entry from link operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String, // HH:MM:SS.mmm
    pub kind: LogKind,
}

impl LogEntry {
    /// Current timestamp as HH:MM:SS.mmm
    #[inline]
    fn now() -> String {
        chrono::Local::now().format("%H:%M:%S%.3f").to_string()
    }

    /// Create a system log entry
    pub fn system(message: impl Into<String>) -> Self {
        Self {
            timestamp: Self::now(),
            kind: LogKind::System {
                message: message.into(),
            },
        }
    }

    /// Create a log entry for an incoming frame
    pub fn frame_in(message: impl Into<String>, size: usize) -> Self {
        Self {
            timestamp: Self::now(),
            kind: LogKind::Frame {
                direction: Direction::In,
                message: message.into(),
                size,
            },
        }
    }

    /// Create a log entry for an outgoing frame
    pub fn frame_out(message: impl Into<String>, size: usize) -> Self {
        Self {
            timestamp: Self::now(),
            kind: LogKind::Frame {
                direction: Direction::Out,
                message: message.into(),
                size,
            },
        }
    }

    /// Create a firmware status entry
    pub fn firmware(level: Option<LogLevel>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Self::now(),
            kind: LogKind::Firmware {
                level,
                message: message.into(),
            },
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LogKind::System { message } => write!(f, "{} [SYS] {}", self.timestamp, message),
            LogKind::Firmware { level, message } => {
                let level_str = match level {
                    Some(LogLevel::Debug) => "[DEBUG]",
                    Some(LogLevel::Info) => "[OK]",
                    Some(LogLevel::Warn) => "[WARN]",
                    Some(LogLevel::Error) => "[ERR]",
                    None => "[FC]",
                };
                write!(f, "{} {} {}", self.timestamp, level_str, message)
            }
            LogKind::Frame {
                direction,
                message,
                size,
            } => {
                let dir = match direction {
                    Direction::In => "IN ",
                    Direction::Out => "OUT",
                };
                write!(f, "{} [{}] {} ({} B)", self.timestamp, dir, message, size)
            }
        }
    }
}
