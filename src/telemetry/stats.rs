// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pipeline statistics.
//!
//! Lightweight counters owned by one SDK instance. Nothing here is global:
//! two instances in the same process never see each other's numbers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counters for every stage of the capture pipeline.
#[derive(Debug)]
pub struct PipelineStats {
    events_captured: AtomicU64,
    events_sampled_out: AtomicU64,
    events_invalid: AtomicU64,
    capture_failures: AtomicU64,
    redaction_failures: AtomicU64,
    events_delivered: AtomicU64,
    events_dropped: AtomicU64,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    retries: AtomicU64,
    delivery_latency: Mutex<Histogram>,
    start_time: Instant,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            events_captured: AtomicU64::new(0),
            events_sampled_out: AtomicU64::new(0),
            events_invalid: AtomicU64::new(0),
            capture_failures: AtomicU64::new(0),
            redaction_failures: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            delivery_latency: Mutex::new(Histogram::default()),
            start_time: Instant::now(),
        }
    }

    pub(crate) fn record_captured(&self) {
        self.events_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sampled_out(&self) {
        self.events_sampled_out.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalid(&self) {
        self.events_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_capture_failure(&self) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_redaction_failure(&self) {
        self.redaction_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_sent(&self, events: usize, latency: Duration) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.events_delivered.fetch_add(events as u64, Ordering::Relaxed);
        self.delivery_latency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(latency);
    }

    pub(crate) fn record_batch_failed(&self, events: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.events_dropped.fetch_add(events as u64, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let latency = self
            .delivery_latency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        StatsSnapshot {
            events_captured: self.events_captured.load(Ordering::Relaxed),
            events_sampled_out: self.events_sampled_out.load(Ordering::Relaxed),
            events_invalid: self.events_invalid.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            redaction_failures: self.redaction_failures.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            delivery_p50: latency.p50(),
            delivery_p99: latency.p99(),
            uptime: self.start_time.elapsed(),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    /// Events accepted into the buffer.
    pub events_captured: u64,
    /// Events discarded because their trace was not sampled.
    pub events_sampled_out: u64,
    /// Events dropped for missing identifiers.
    pub events_invalid: u64,
    /// Telemetry builders that failed or panicked.
    pub capture_failures: u64,
    /// Redaction transforms that failed (event passed unredacted).
    pub redaction_failures: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    /// Delivery attempts beyond the first.
    pub retries: u64,
    pub delivery_p50: Duration,
    pub delivery_p99: Duration,
    pub uptime: Duration,
}

impl StatsSnapshot {
    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        format!(
            "captured {} (sampled out {}, invalid {}, capture failures {}, redaction failures {})\n\
             delivered {} in {} batches, dropped {} in {} batches, {} retries\n\
             delivery p50 {:.2?}, p99 {:.2?}, uptime {:.2?}",
            self.events_captured,
            self.events_sampled_out,
            self.events_invalid,
            self.capture_failures,
            self.redaction_failures,
            self.events_delivered,
            self.batches_sent,
            self.events_dropped,
            self.batches_failed,
            self.retries,
            self.delivery_p50,
            self.delivery_p99,
            self.uptime,
        )
    }
}

/// Fixed-bucket latency histogram.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Bucket upper bounds in milliseconds.
    buckets: Vec<u64>,
    /// Count per bucket, plus one overflow bucket.
    counts: Vec<u64>,
}

impl Histogram {
    /// Create a histogram with custom bucket bounds (in milliseconds).
    pub fn with_buckets(buckets: Vec<u64>) -> Self {
        let counts = vec![0; buckets.len() + 1];
        Self { buckets, counts }
    }

    pub fn record(&mut self, duration: Duration) {
        let millis = duration.as_millis() as u64;
        let idx = self
            .buckets
            .iter()
            .position(|&b| millis <= b)
            .unwrap_or(self.buckets.len());
        self.counts[idx] += 1;
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Approximate percentile as the upper bound of the containing bucket.
    pub fn percentile(&self, p: f64) -> Duration {
        let total = self.total();
        if total == 0 {
            return Duration::ZERO;
        }

        let target = ((total as f64 * p / 100.0).ceil() as u64).max(1);
        let mut cumulative = 0u64;
        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                let millis = match self.buckets.get(i) {
                    Some(bound) => *bound,
                    None => self.buckets.last().copied().unwrap_or(0) * 10,
                };
                return Duration::from_millis(millis);
            }
        }
        Duration::ZERO
    }

    pub fn p50(&self) -> Duration {
        self.percentile(50.0)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(99.0)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        // 10ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
        Self::with_buckets(vec![10, 50, 100, 250, 500, 1_000, 5_000, 10_000])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = PipelineStats::new();
        stats.record_captured();
        stats.record_captured();
        stats.record_sampled_out();
        stats.record_invalid();
        stats.record_capture_failure();
        stats.record_redaction_failure();
        stats.record_retry();
        stats.record_batch_sent(2, Duration::from_millis(30));
        stats.record_batch_failed(5);

        let snap = stats.snapshot();
        assert_eq!(snap.events_captured, 2);
        assert_eq!(snap.events_sampled_out, 1);
        assert_eq!(snap.events_invalid, 1);
        assert_eq!(snap.capture_failures, 1);
        assert_eq!(snap.redaction_failures, 1);
        assert_eq!(snap.retries, 1);
        assert_eq!(snap.events_delivered, 2);
        assert_eq!(snap.batches_sent, 1);
        assert_eq!(snap.events_dropped, 5);
        assert_eq!(snap.batches_failed, 1);
        assert_eq!(snap.delivery_p50, Duration::from_millis(50));
    }

    #[test]
    fn test_histogram_buckets() {
        let mut hist = Histogram::with_buckets(vec![10, 100]);
        hist.record(Duration::from_millis(5));
        hist.record(Duration::from_millis(50));
        hist.record(Duration::from_millis(500));
        assert_eq!(hist.counts(), &[1, 1, 1]);
        assert_eq!(hist.total(), 3);
        assert_eq!(hist.percentile(100.0), Duration::from_millis(1_000));
    }

    #[test]
    fn test_histogram_empty() {
        assert_eq!(Histogram::default().p99(), Duration::ZERO);
    }

    #[test]
    fn test_report_mentions_counts() {
        let stats = PipelineStats::new();
        stats.record_batch_failed(7);
        let report = stats.snapshot().format_report();
        assert!(report.contains("dropped 7"));
    }
}
