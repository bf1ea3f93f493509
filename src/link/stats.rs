//! Traffic statistics for a link
//!
//! Thread-safe counters for packets and bytes/sec throughput.
//! Uses lock-free atomics for all operations.

use crate::constants::RATE_UPDATE_MIN_INTERVAL_SECS;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Packet and byte counters with rate calculation (fully lock-free)
pub struct LinkStats {
    /// Frames handed to the transport
    sent: AtomicU64,
    /// Frames that passed framing and checksum
    received: AtomicU64,
    /// Units rejected by framing or checksum
    error_packets: AtomicU64,
    /// Frames or events discarded on a full queue
    dropped: AtomicU64,
    /// Total bytes transmitted
    tx_total: AtomicU64,
    /// Total bytes received
    rx_total: AtomicU64,
    /// Snapshot of tx_total at last rate calculation
    tx_snapshot: AtomicU64,
    /// Snapshot of rx_total at last rate calculation
    rx_snapshot: AtomicU64,
    /// Reference instant for time calculations
    start_time: Instant,
    /// Nanoseconds since start_time at last rate calculation
    last_calc_nanos: AtomicU64,
    /// Cached TX rate in bytes/sec (stored as f64 bits)
    tx_rate: AtomicU64,
    /// Cached RX rate in bytes/sec (stored as f64 bits)
    rx_rate: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub sent: u64,
    pub received: u64,
    pub error_packets: u64,
    pub dropped: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent {} ({} B), received {} ({} B), errors {}, dropped {}",
            self.sent,
            self.tx_bytes,
            self.received,
            self.rx_bytes,
            self.error_packets,
            self.dropped
        )
    }
}

impl LinkStats {
    pub fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            error_packets: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            tx_total: AtomicU64::new(0),
            rx_total: AtomicU64::new(0),
            tx_snapshot: AtomicU64::new(0),
            rx_snapshot: AtomicU64::new(0),
            start_time: Instant::now(),
            last_calc_nanos: AtomicU64::new(0),
            tx_rate: AtomicU64::new(0),
            rx_rate: AtomicU64::new(0),
        }
    }

    /// Count one outgoing frame of `bytes` length (Host -> Device)
    #[inline]
    pub fn record_sent(&self, bytes: usize) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.tx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one valid incoming frame of `bytes` length (Device -> Host)
    #[inline]
    pub fn record_received(&self, bytes: usize) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.rx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one rejected unit
    #[inline]
    pub fn record_error(&self) {
        self.error_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one frame or event lost to a full queue
    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn error_packets(&self) -> u64 {
        self.error_packets.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent(),
            received: self.received(),
            error_packets: self.error_packets(),
            dropped: self.dropped(),
            tx_bytes: self.tx_total.load(Ordering::Relaxed),
            rx_bytes: self.rx_total.load(Ordering::Relaxed),
        }
    }

    /// Update rate calculations and return (tx_kb_s, rx_kb_s)
    ///
    /// Call this periodically (e.g., every 500ms).
    pub fn update_rates(&self) -> (f64, f64) {
        let now_nanos = self.start_time.elapsed().as_nanos() as u64;
        let last_nanos = self.last_calc_nanos.load(Ordering::Relaxed);
        let elapsed = now_nanos.saturating_sub(last_nanos) as f64 / 1_000_000_000.0;

        if elapsed < RATE_UPDATE_MIN_INTERVAL_SECS {
            // Too soon, return cached values
            return self.cached_rates();
        }

        // Try to claim the update (avoid duplicate calculations)
        if self
            .last_calc_nanos
            .compare_exchange(last_nanos, now_nanos, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            // Another thread got there first, return cached values
            return self.cached_rates();
        }

        let tx_now = self.tx_total.load(Ordering::Relaxed);
        let rx_now = self.rx_total.load(Ordering::Relaxed);
        let tx_prev = self.tx_snapshot.swap(tx_now, Ordering::Relaxed);
        let rx_prev = self.rx_snapshot.swap(rx_now, Ordering::Relaxed);

        let tx_rate = (tx_now - tx_prev) as f64 / elapsed / 1024.0; // KB/s
        let rx_rate = (rx_now - rx_prev) as f64 / elapsed / 1024.0; // KB/s

        self.tx_rate.store(tx_rate.to_bits(), Ordering::Relaxed);
        self.rx_rate.store(rx_rate.to_bits(), Ordering::Relaxed);

        (tx_rate, rx_rate)
    }

    fn cached_rates(&self) -> (f64, f64) {
        let tx = f64::from_bits(self.tx_rate.load(Ordering::Relaxed));
        let rx = f64::from_bits(self.rx_rate.load(Ordering::Relaxed));
        (tx, rx)
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}
