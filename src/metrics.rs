// src/metrics.rs
//! Run-loop counters. Counters, not correctness: everything here is advisory
//! and surfaced through the periodic stats log.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    add_orders: AtomicU64,
    delete_orders: AtomicU64,
    executions: AtomicU64,
    trades: AtomicU64,
    decode_errors: AtomicU64,
    anomalies: AtomicU64,
    evicted_orders: AtomicU64,
    packet_gaps: AtomicU64,
}

/// Point-in-time copy of the counters, for logging and assertions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub add_orders: u64,
    pub delete_orders: u64,
    pub executions: u64,
    pub trades: u64,
    pub decode_errors: u64,
    pub anomalies: u64,
    pub evicted_orders: u64,
    pub packet_gaps: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_add(&self) {
        self.add_orders.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_delete(&self) {
        self.delete_orders.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_execution(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_trade(&self) {
        self.trades.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_anomaly(&self) {
        self.anomalies.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_packet_gap(&self) {
        self.packet_gaps.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn add_evicted(&self, n: u64) {
        self.evicted_orders.fetch_add(n, Ordering::Relaxed);
    }

    pub fn load(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            add_orders: self.add_orders.load(Ordering::Relaxed),
            delete_orders: self.delete_orders.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            trades: self.trades.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            evicted_orders: self.evicted_orders.load(Ordering::Relaxed),
            packet_gaps: self.packet_gaps.load(Ordering::Relaxed),
        }
    }
}
