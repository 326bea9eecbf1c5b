use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the dispatcher and the flush scheduler.
#[derive(Debug, Default)]
pub struct SinkStats {
    /// Records handed to the dispatcher (before severity filtering).
    pub emitted: AtomicU64,
    /// Documents appended to the bulk buffer.
    pub buffered: AtomicU64,
    /// Transport calls made, successful or not.
    pub flushes: AtomicU64,
    pub failed_flushes: AtomicU64,
    /// Documents lost to failed flushes.
    pub dropped_documents: AtomicU64,
    /// Flush requests dropped because one was already pending.
    pub coalesced_signals: AtomicU64,
    pub local_write_errors: AtomicU64,
}

/// Point-in-time copy of [`SinkStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub emitted: u64,
    pub buffered: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
    pub dropped_documents: u64,
    pub coalesced_signals: u64,
    pub local_write_errors: u64,
}

impl SinkStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            emitted: self.emitted.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            dropped_documents: self.dropped_documents.load(Ordering::Relaxed),
            coalesced_signals: self.coalesced_signals.load(Ordering::Relaxed),
            local_write_errors: self.local_write_errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}
