//! Metrics for observability
//!
//! Everything goes through the `metrics` facade; no recorder is installed
//! here, so without one the calls are no-ops. Per-replica totals are also
//! kept in a `MetricsCollector` for reports that do not want a recorder.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

mod collector;

pub use collector::{MetricsCollector, MetricsSnapshot};

pub const OPS_LOCAL: &str = "quilt.ops.local";
pub const OPS_REMOTE_APPLIED: &str = "quilt.ops.remote.applied";
pub const OPS_REMOTE_IGNORED: &str = "quilt.ops.remote.ignored";
pub const OPS_MALFORMED: &str = "quilt.ops.malformed";
pub const INDEX_REBUILDS: &str = "quilt.index.rebuilds";
pub const INDEX_ENTRIES: &str = "quilt.index.entries";
pub const INDEX_QUERY_DURATION: &str = "quilt.index.query.duration_ms";
pub const PRESENCE_PEERS: &str = "quilt.presence.peers";
pub const SYNC_SESSIONS: &str = "quilt.sync.sessions";
pub const SYNC_OPS_SENT: &str = "quilt.sync.ops_sent";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    // Merge engine
    describe_counter!(OPS_LOCAL, "Operations originated by this replica");
    describe_counter!(OPS_REMOTE_APPLIED, "Remote operations logged for the first time");
    describe_counter!(OPS_REMOTE_IGNORED, "Remote operations already present in the log");
    describe_counter!(OPS_MALFORMED, "Operations dropped by validation");

    // Spatial index
    describe_counter!(INDEX_REBUILDS, "Full spatial index rebuilds");
    describe_gauge!(INDEX_ENTRIES, "Entities currently held by the spatial index");
    describe_histogram!(INDEX_QUERY_DURATION, "Region query duration in milliseconds");

    // Presence and sync
    describe_gauge!(PRESENCE_PEERS, "Peers with live presence entries");
    describe_gauge!(SYNC_SESSIONS, "Sync sessions currently running");
    describe_counter!(SYNC_OPS_SENT, "Operations sent to peers");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a gauge metric
pub fn record_gauge(name: &'static str, value: f64) {
    gauge!(name).set(value);
}

/// Record a histogram metric
pub fn record_histogram(name: &'static str, value: f64) {
    histogram!(name).record(value);
}

/// Adjust the running-sessions gauge
pub fn session_started() {
    gauge!(SYNC_SESSIONS).increment(1.0);
}

pub fn session_ended() {
    gauge!(SYNC_SESSIONS).decrement(1.0);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
    }
}
