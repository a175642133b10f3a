//! Per-replica metric totals

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals for one replica
#[derive(Debug, Default)]
pub struct MetricsCollector {
    local_ops: AtomicU64,
    remote_applied: AtomicU64,
    remote_ignored: AtomicU64,
    malformed: AtomicU64,
    index_rebuilds: AtomicU64,
    ops_sent: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_local_ops(&self) {
        self.local_ops.fetch_add(1, Ordering::Relaxed);
        super::record_counter(super::OPS_LOCAL, 1);
    }

    pub fn inc_remote_applied(&self) {
        self.remote_applied.fetch_add(1, Ordering::Relaxed);
        super::record_counter(super::OPS_REMOTE_APPLIED, 1);
    }

    pub fn inc_remote_ignored(&self) {
        self.remote_ignored.fetch_add(1, Ordering::Relaxed);
        super::record_counter(super::OPS_REMOTE_IGNORED, 1);
    }

    pub fn inc_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        super::record_counter(super::OPS_MALFORMED, 1);
    }

    pub fn inc_index_rebuilds(&self) {
        self.index_rebuilds.fetch_add(1, Ordering::Relaxed);
        super::record_counter(super::INDEX_REBUILDS, 1);
    }

    pub fn add_ops_sent(&self, count: u64) {
        self.ops_sent.fetch_add(count, Ordering::Relaxed);
        super::record_counter(super::SYNC_OPS_SENT, count);
    }

    /// Get a snapshot of current totals
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: std::time::SystemTime::now(),
            local_ops: self.local_ops.load(Ordering::Relaxed),
            remote_applied: self.remote_applied.load(Ordering::Relaxed),
            remote_ignored: self.remote_ignored.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            index_rebuilds: self.index_rebuilds.load(Ordering::Relaxed),
            ops_sent: self.ops_sent.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a collector
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: std::time::SystemTime,
    pub local_ops: u64,
    pub remote_applied: u64,
    pub remote_ignored: u64,
    pub malformed: u64,
    pub index_rebuilds: u64,
    pub ops_sent: u64,
}
