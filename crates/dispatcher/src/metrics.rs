//! Worker metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Items delivered
    delivered_count: AtomicU64,
    /// Items whose delivery finally failed
    failure_count: AtomicU64,
    /// Extra delivery attempts
    retry_count: AtomicU64,
    /// Items that never reached the delivery action
    dropped_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered_count.load(Ordering::Relaxed)
    }

    pub fn inc_delivered_count(&self) {
        self.delivered_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub fn inc_retry_count(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn add_dropped_count(&self, count: u64) {
        self.dropped_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            delivered_count: self.delivered_count(),
            failure_count: self.failure_count(),
            retry_count: self.retry_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub delivered_count: u64,
    pub failure_count: u64,
    pub retry_count: u64,
    pub dropped_count: u64,
}

/// Metrics for the source consumer
#[derive(Debug, Default)]
pub struct SourceMetrics {
    dequeued_count: AtomicU64,
    empty_polls: AtomicU64,
    queue_retries: AtomicU64,
    /// Broadcasts cut short by a stop request
    broadcasts_cancelled: AtomicU64,
}

impl SourceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dequeued_count(&self) -> u64 {
        self.dequeued_count.load(Ordering::Relaxed)
    }

    pub fn inc_dequeued_count(&self) {
        self.dequeued_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn empty_polls(&self) -> u64 {
        self.empty_polls.load(Ordering::Relaxed)
    }

    pub fn inc_empty_polls(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_retries(&self) -> u64 {
        self.queue_retries.load(Ordering::Relaxed)
    }

    pub fn inc_queue_retries(&self) {
        self.queue_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcasts_cancelled(&self) -> u64 {
        self.broadcasts_cancelled.load(Ordering::Relaxed)
    }

    pub fn inc_broadcasts_cancelled(&self) {
        self.broadcasts_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            dequeued_count: self.dequeued_count(),
            empty_polls: self.empty_polls(),
            queue_retries: self.queue_retries(),
            broadcasts_cancelled: self.broadcasts_cancelled(),
        }
    }
}

/// Snapshot of source metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub dequeued_count: u64,
    pub empty_polls: u64,
    pub queue_retries: u64,
    pub broadcasts_cancelled: u64,
}
