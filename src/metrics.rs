//! Lock-free pipeline counters and the value-type snapshot.
//!
//! Every observable event moves an atomic counter; `snapshot` reads each
//! field atomically and returns an owned value, so it can race with writers
//! without blocking them (individual counters are consistent, the set as a
//! whole is a point-in-time approximation).

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::levels::{LEVELS, Level};

/// Why a message was dropped instead of being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Filtered,
    Sampled,
    QueueFull,
    /// Recovery was exhausted on at least one enabled destination.
    WriteFailed,
}

#[derive(Default)]
pub(crate) struct Metrics {
    bytes_written: AtomicU64,
    messages_logged: AtomicU64,
    messages_dropped: AtomicU64,
    dropped_filtered: AtomicU64,
    dropped_sampled: AtomicU64,
    dropped_queue_full: AtomicU64,
    dropped_write_failed: AtomicU64,
    below_level: AtomicU64,
    error_count: AtomicU64,
    rotation_count: AtomicU64,
    compression_count: AtomicU64,
    by_level: [AtomicU64; 5],
    errors_by_source: Mutex<AHashMap<String, u64>>,
}

impl Metrics {
    pub(crate) fn inc_logged(&self, level: Level) {
        self.messages_logged.fetch_add(1, Ordering::Relaxed);
        self.by_level[level.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_bytes(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn inc_dropped(&self, reason: DropReason) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        let counter = match reason {
            DropReason::Filtered => &self.dropped_filtered,
            DropReason::Sampled => &self.dropped_sampled,
            DropReason::QueueFull => &self.dropped_queue_full,
            DropReason::WriteFailed => &self.dropped_write_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_below_level(&self) {
        self.below_level.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_error(&self, source: &str) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        let mut by_source = self.errors_by_source.lock();
        *by_source.entry(source.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn inc_rotation(&self) {
        self.rotation_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_compression(&self) {
        self.compression_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(
        &self,
        active_destinations: usize,
        disabled_destinations: usize,
        channel_utilization: f64,
    ) -> MetricsSnapshot {
        let mut messages_by_level = AHashMap::with_capacity(LEVELS.len());
        for level in LEVELS {
            messages_by_level.insert(level, self.by_level[level.index()].load(Ordering::Relaxed));
        }
        MetricsSnapshot {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            messages_logged: self.messages_logged.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            dropped_filtered: self.dropped_filtered.load(Ordering::Relaxed),
            dropped_sampled: self.dropped_sampled.load(Ordering::Relaxed),
            dropped_queue_full: self.dropped_queue_full.load(Ordering::Relaxed),
            dropped_write_failed: self.dropped_write_failed.load(Ordering::Relaxed),
            messages_below_level: self.below_level.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            errors_by_source: self.errors_by_source.lock().clone(),
            messages_by_level,
            rotation_count: self.rotation_count.load(Ordering::Relaxed),
            compression_count: self.compression_count.load(Ordering::Relaxed),
            active_destinations,
            disabled_destinations,
            channel_utilization,
        }
    }

    #[cfg(test)]
    pub(crate) fn snapshot_error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

/// A point-in-time copy of every counter. Owned, no aliasing.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub bytes_written: u64,
    pub messages_logged: u64,
    pub messages_dropped: u64,
    pub dropped_filtered: u64,
    pub dropped_sampled: u64,
    pub dropped_queue_full: u64,
    pub dropped_write_failed: u64,
    pub messages_below_level: u64,
    pub error_count: u64,
    pub errors_by_source: AHashMap<String, u64>,
    pub messages_by_level: AHashMap<Level, u64>,
    pub rotation_count: u64,
    pub compression_count: u64,
    pub active_destinations: usize,
    pub disabled_destinations: usize,
    /// Fraction of the bounded channel currently occupied, 0..=1.
    pub channel_utilization: f64,
}
