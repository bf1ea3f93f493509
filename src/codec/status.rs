//! Firmware status line parsing
//!
//! The flight controller answers commands with short text lines on the same
//! UART as binary frames.
//! Format: `OK: <what>` / `ERR: <reason>` / free text (e.g. `PONG`)

use crate::logging::LogLevel;

/// Parse a firmware status line
///
/// Returns (Some(level), message) for `OK:`/`ERR:` lines, (None, text) otherwise.
/// NUL padding and surrounding whitespace are removed.
pub fn parse(text: &str) -> (Option<LogLevel>, String) {
    let clean = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());

    if let Some(msg) = clean.strip_prefix("OK:") {
        (Some(LogLevel::Info), msg.trim_start().to_string())
    } else if let Some(msg) = clean.strip_prefix("ERR:") {
        (Some(LogLevel::Error), msg.trim_start().to_string())
    } else {
        (None, clean.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok() {
        let (level, msg) = parse("OK: thrust");
        assert_eq!(level, Some(LogLevel::Info));
        assert_eq!(msg, "thrust");
    }

    #[test]
    fn test_parse_err() {
        let (level, msg) = parse("ERR: CRC mismatch\r");
        assert_eq!(level, Some(LogLevel::Error));
        assert_eq!(msg, "CRC mismatch");
    }

    #[test]
    fn test_parse_free_text() {
        let (level, msg) = parse("\0\0PONG\0");
        assert_eq!(level, None);
        assert_eq!(msg, "PONG");
    }
}
