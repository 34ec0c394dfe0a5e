//! Connection metrics
//!
//! Counters for the conditions the connection manager reports locally
//! (dropped sends, unparseable frames, failing listeners) alongside traffic.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared connection counters
#[derive(Clone, Default)]
pub struct ConnectionMetrics {
    /// Successful socket opens
    connections_opened: Arc<AtomicU64>,
    /// Reconnect timers armed
    reconnects_scheduled: Arc<AtomicU64>,
    /// Frames written to the socket
    frames_sent: Arc<AtomicU64>,
    /// Text frames received
    frames_received: Arc<AtomicU64>,
    /// Sends dropped because the socket was not connected
    sends_dropped: Arc<AtomicU64>,
    /// Inbound frames that failed to parse
    parse_errors: Arc<AtomicU64>,
    /// Listener invocations that failed or panicked
    listener_failures: Arc<AtomicU64>,
}

impl ConnectionMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_dropped(&self) {
        self.sends_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_listener_failures(&self, count: usize) {
        if count > 0 {
            self.listener_failures
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            sends_dropped: self.sends_dropped.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ConnectionMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub reconnects_scheduled: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub sends_dropped: u64,
    pub parse_errors: u64,
    pub listener_failures: u64,
}
