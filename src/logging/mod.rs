//! Logging
//!
//! Two layers:
//! - `tracing` for internal diagnostics (initialised by `init_tracing`)
//! - `LogEntry` events of a link, printed by the CLI and optionally written
//!   to a rotating file (`file`)

pub mod entry;
pub mod file;

pub use entry::{Direction, LogEntry, LogKind, LogLevel};

use tokio::sync::mpsc;

/// Initialize internal tracing for diagnostic output
///
/// Call early in main() before any logging occurs.
/// Set `verbose` to true for debug-level output. `RUST_LOG` overrides both.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_file(false)
                .compact(),
        )
        .with(filter)
        .try_init();
}

/// Send a log entry without blocking
///
/// Drops the entry when the channel is full or closed; log events never
/// stall a link.
pub fn try_log(tx: &Option<mpsc::Sender<LogEntry>>, entry: LogEntry) {
    if let Some(tx) = tx {
        let _ = tx.try_send(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_log_without_channel() {
        try_log(&None, LogEntry::system("ignored"));
    }

    #[test]
    fn test_try_log_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let tx = Some(tx);
        try_log(&tx, LogEntry::system("first"));
        try_log(&tx, LogEntry::system("second"));

        let first = rx.try_recv().unwrap();
        assert!(matches!(first.kind, LogKind::System { ref message } if message == "first"));
        assert!(rx.try_recv().is_err());
    }
}
