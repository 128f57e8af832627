//! Pipeline metrics for observability
//!
//! Counters are shared between the producer handle and the worker threads.
//! None of them is ever written back into the log stream.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for pipeline health
///
/// # Example
///
/// ```
/// use logpipe::LoggerMetrics;
///
/// let metrics = LoggerMetrics::new();
/// metrics.record_enqueued();
/// metrics.record_dropped();
///
/// assert_eq!(metrics.dropped_count(), 1);
/// assert_eq!(metrics.total_enqueued(), 1);
/// ```
#[derive(Debug)]
pub struct LoggerMetrics {
    /// Records accepted by the dispatch queue
    enqueued: AtomicU64,

    /// Records rejected because the dispatch queue was full
    dropped: AtomicU64,

    /// Lines rejected because the ingestion queue was full
    ingest_dropped: AtomicU64,

    /// Records appended to the destination
    written: AtomicU64,

    batches_written: AtomicU64,

    /// Batches abandoned after exhausting write attempts
    batches_dropped: AtomicU64,

    write_retries: AtomicU64,

    /// Records written to the forwarding connection
    forwarded: AtomicU64,

    /// Records drained by the forwarder but lost to a transport failure
    lost_in_flight: AtomicU64,

    reconnects: AtomicU64,

    connections_accepted: AtomicU64,
}

impl LoggerMetrics {
    /// Create a new metrics instance with all counters at zero
    pub const fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            ingest_dropped: AtomicU64::new(0),
            written: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            batches_dropped: AtomicU64::new(0),
            write_retries: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            lost_in_flight: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            connections_accepted: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn total_enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Number of records dropped by the producer-side drop policy
    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn ingest_dropped_count(&self) -> u64 {
        self.ingest_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total_written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn batches_written(&self) -> u64 {
        self.batches_written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn batches_dropped(&self) -> u64 {
        self.batches_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn write_retries(&self) -> u64 {
        self.write_retries.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total_forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn lost_in_flight(&self) -> u64 {
        self.lost_in_flight.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn connections_accepted(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_enqueued(&self) -> u64 {
        self.enqueued.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a dropped log; returns the previous count
    #[inline]
    pub fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_ingest_dropped(&self) -> u64 {
        self.ingest_dropped.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_batch_written(&self, records: usize) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.written.fetch_add(records as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_batch_dropped(&self) -> u64 {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_write_retry(&self) -> u64 {
        self.write_retries.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_forwarded(&self, records: usize) {
        self.forwarded.fetch_add(records as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_lost_in_flight(&self, records: usize) {
        self.lost_in_flight.fetch_add(records as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reconnect(&self) -> u64 {
        self.reconnects.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_connection_accepted(&self) -> u64 {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed)
    }

    /// Get drop rate as a percentage (0.0 - 100.0)
    ///
    /// Returns 0.0 if nothing has been offered to the queue.
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.dropped_count() as f64;
        let total = self.total_enqueued() as f64 + dropped;
        if total == 0.0 {
            0.0
        } else {
            (dropped / total) * 100.0
        }
    }
}

impl Default for LoggerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LoggerMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            enqueued: AtomicU64::new(self.total_enqueued()),
            dropped: AtomicU64::new(self.dropped_count()),
            ingest_dropped: AtomicU64::new(self.ingest_dropped_count()),
            written: AtomicU64::new(self.total_written()),
            batches_written: AtomicU64::new(self.batches_written()),
            batches_dropped: AtomicU64::new(self.batches_dropped()),
            write_retries: AtomicU64::new(self.write_retries()),
            forwarded: AtomicU64::new(self.total_forwarded()),
            lost_in_flight: AtomicU64::new(self.lost_in_flight()),
            reconnects: AtomicU64::new(self.reconnects()),
            connections_accepted: AtomicU64::new(self.connections_accepted()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = LoggerMetrics::new();
        assert_eq!(metrics.dropped_count(), 0);
        assert_eq!(metrics.total_enqueued(), 0);
        assert_eq!(metrics.total_written(), 0);
        assert_eq!(metrics.reconnects(), 0);
    }

    #[test]
    fn test_metrics_record_dropped() {
        let metrics = LoggerMetrics::new();
        assert_eq!(metrics.record_dropped(), 0); // Returns previous value
        assert_eq!(metrics.dropped_count(), 1);
        metrics.record_dropped();
        assert_eq!(metrics.dropped_count(), 2);
    }

    #[test]
    fn test_metrics_batches() {
        let metrics = LoggerMetrics::new();
        metrics.record_batch_written(10);
        metrics.record_batch_written(5);
        assert_eq!(metrics.batches_written(), 2);
        assert_eq!(metrics.total_written(), 15);
    }

    #[test]
    fn test_metrics_drop_rate() {
        let metrics = LoggerMetrics::new();
        assert_eq!(metrics.drop_rate(), 0.0);

        for _ in 0..100 {
            metrics.record_enqueued();
        }
        assert_eq!(metrics.drop_rate(), 0.0);

        // 100 enqueued, 10 dropped - ~9.09% drop rate
        for _ in 0..10 {
            metrics.record_dropped();
        }
        let rate = metrics.drop_rate();
        assert!(rate > 9.0 && rate < 10.0, "Drop rate was {}", rate);
    }

    #[test]
    fn test_metrics_clone() {
        let metrics = LoggerMetrics::new();
        metrics.record_dropped();
        metrics.record_forwarded(3);

        let snapshot = metrics.clone();
        assert_eq!(snapshot.dropped_count(), 1);
        assert_eq!(snapshot.total_forwarded(), 3);

        // Original and clone are independent
        metrics.record_dropped();
        assert_eq!(metrics.dropped_count(), 2);
        assert_eq!(snapshot.dropped_count(), 1);
    }
}
