//! Semantic metrics surface. Counters and gauges are plain atomics; how
//! they are exported is the embedder's business.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Classification for `sequence_errors_total`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SequenceErrorKind {
    BadSession,
    BadSlot,
    Misordered,
    RetryUncached,
    Delay,
}

#[derive(Debug, Default)]
pub struct ServerMetrics {
    /// SEQUENCE operations processed.
    pub sequence_total: AtomicU64,
    pub sequence_err_bad_session: AtomicU64,
    pub sequence_err_bad_slot: AtomicU64,
    pub sequence_err_misordered: AtomicU64,
    pub sequence_err_retry_uncached: AtomicU64,
    pub sequence_err_delay: AtomicU64,
    /// Replays served verbatim from a slot cache.
    pub replay_hits_total: AtomicU64,
    /// Slots currently reserved across all sessions.
    pub slots_in_use: AtomicI64,
    /// Total bytes held in slot reply caches.
    pub replay_cache_bytes: AtomicI64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        ServerMetrics::default()
    }

    pub fn sequence_seen(&self) {
        self.sequence_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sequence_error(&self, kind: SequenceErrorKind) {
        let counter = match kind {
            SequenceErrorKind::BadSession => &self.sequence_err_bad_session,
            SequenceErrorKind::BadSlot => &self.sequence_err_bad_slot,
            SequenceErrorKind::Misordered => &self.sequence_err_misordered,
            SequenceErrorKind::RetryUncached => &self.sequence_err_retry_uncached,
            SequenceErrorKind::Delay => &self.sequence_err_delay,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn replay_hit(&self) {
        self.replay_hits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn slot_reserved(&self) {
        self.slots_in_use.fetch_add(1, Ordering::Relaxed);
    }

    pub fn slot_released(&self) {
        self.slots_in_use.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn cache_bytes_added(&self, n: usize) {
        self.replay_cache_bytes.fetch_add(n as i64, Ordering::Relaxed);
    }

    pub fn cache_bytes_released(&self, n: usize) {
        self.replay_cache_bytes.fetch_sub(n as i64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = ServerMetrics::new();
        metrics.sequence_seen();
        metrics.sequence_seen();
        metrics.sequence_error(SequenceErrorKind::Misordered);
        metrics.replay_hit();
        metrics.slot_reserved();
        metrics.slot_released();
        metrics.cache_bytes_added(128);
        metrics.cache_bytes_released(64);

        assert_eq!(metrics.sequence_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.sequence_err_misordered.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.replay_hits_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.slots_in_use.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.replay_cache_bytes.load(Ordering::Relaxed), 64);
    }
}
