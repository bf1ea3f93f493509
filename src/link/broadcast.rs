//! Periodic broadcast scheduling
//!
//! Cooperative polling: one poller ticks at a fixed rate and fires every
//! registered broadcast whose interval has elapsed. Broadcasts due on the
//! same tick fire in insertion order.

use crate::protocol::JsonMessage;
use std::time::{Duration, Instant};

/// One registered broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub message: JsonMessage,
    pub port: u16,
    pub interval: Duration,
    last_sent: Option<Instant>,
}

impl Broadcast {
    pub fn new(message: JsonMessage, port: u16, interval: Duration) -> Self {
        Self {
            message,
            port,
            interval,
            last_sent: None,
        }
    }

    /// Never sent, or more than `interval` since the last send
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_sent {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        }
    }
}

/// Registered broadcasts in insertion order
#[derive(Debug, Default)]
pub struct BroadcastScheduler {
    broadcasts: Vec<Broadcast>,
}

impl BroadcastScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a broadcast; returns its index
    pub fn add(&mut self, broadcast: Broadcast) -> usize {
        self.broadcasts.push(broadcast);
        self.broadcasts.len() - 1
    }

    pub fn len(&self) -> usize {
        self.broadcasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.broadcasts.is_empty()
    }

    /// Broadcasts due at `now`, marked as sent
    pub fn poll(&mut self, now: Instant) -> Vec<Broadcast> {
        self.broadcasts
            .iter_mut()
            .filter(|b| b.is_due(now))
            .map(|b| {
                b.last_sent = Some(now);
                b.clone()
            })
            .collect()
    }
}
