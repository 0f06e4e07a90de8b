//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the engine and its maintenance loop.
#[derive(Debug, Default)]
pub(crate) struct EngineMetrics {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) flushes: AtomicU64,
    pub(crate) flush_errors: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) loop_restarts: AtomicU64,
}

impl EngineMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters; container sizes are supplied by the caller.
    pub(crate) fn snapshot(&self, entry_count: u64, pending_writes: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            pending_writes,
            flushes: self.flushes.load(Ordering::Relaxed),
            flush_errors: self.flush_errors.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            loop_restarts: self.loop_restarts.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from a live cache entry.
    pub hits: u64,
    /// Reads that fell through to the backing store.
    pub misses: u64,
    /// Number of entries currently cached (expired but unswept included).
    pub entry_count: u64,
    /// Number of IDs waiting to be flushed.
    pub pending_writes: u64,
    /// Successful flushes to the backing store.
    pub flushes: u64,
    /// Flushes that failed and were re-queued.
    pub flush_errors: u64,
    /// Entries removed because they expired.
    pub evictions: u64,
    /// Times the maintenance loop was restarted after a panic.
    pub loop_restarts: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
