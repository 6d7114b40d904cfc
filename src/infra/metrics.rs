//! Lock-free pipeline counters and periodic reporting
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only; do not use them for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters for every outcome of the ingest pipeline
pub struct Metrics {
    reports_received: AtomicU64,
    decode_failures: AtomicU64,
    validation_failures: AtomicU64,
    persist_failures: AtomicU64,
    locations_persisted: AtomicU64,
    alerts_published: AtomicU64,
    publish_failures: AtomicU64,
    /// Reports since last `report()` (reset on report)
    received_since_report: AtomicU64,
    last_report: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            reports_received: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            locations_persisted: AtomicU64::new(0),
            alerts_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            received_since_report: AtomicU64::new(0),
            last_report: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_report_received(&self) {
        self.reports_received.fetch_add(1, Ordering::Relaxed);
        self.received_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_location_persisted(&self) {
        self.locations_persisted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alerts_published(&self, count: u64) {
        self.alerts_published.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters and reset the per-interval rate
    pub fn report(&self) -> MetricsSummary {
        let now = Instant::now();
        let elapsed = {
            let mut last = self.last_report.lock();
            let elapsed = now.duration_since(*last);
            *last = now;
            elapsed
        };
        let since = self.received_since_report.swap(0, Ordering::Relaxed);
        let secs = elapsed.as_secs_f64();
        let reports_per_sec = if secs > 0.0 { since as f64 / secs } else { 0.0 };

        MetricsSummary {
            reports_received: self.reports_received.load(Ordering::Relaxed),
            reports_per_sec,
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            locations_persisted: self.locations_persisted.load(Ordering::Relaxed),
            alerts_published: self.alerts_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the pipeline counters
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub reports_received: u64,
    pub reports_per_sec: f64,
    pub decode_failures: u64,
    pub validation_failures: u64,
    pub persist_failures: u64,
    pub locations_persisted: u64,
    pub alerts_published: u64,
    pub publish_failures: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            reports_received = %self.reports_received,
            reports_per_sec = %format!("{:.2}", self.reports_per_sec),
            decode_failures = %self.decode_failures,
            validation_failures = %self.validation_failures,
            persist_failures = %self.persist_failures,
            locations_persisted = %self.locations_persisted,
            alerts_published = %self.alerts_published,
            publish_failures = %self.publish_failures,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_report_received();
        metrics.record_report_received();
        metrics.record_decode_failure();
        metrics.record_location_persisted();
        metrics.record_alerts_published(2);

        let summary = metrics.report();
        assert_eq!(summary.reports_received, 2);
        assert_eq!(summary.decode_failures, 1);
        assert_eq!(summary.locations_persisted, 1);
        assert_eq!(summary.alerts_published, 2);
        assert_eq!(summary.publish_failures, 0);
    }

    #[test]
    fn test_report_keeps_totals_but_resets_rate() {
        let metrics = Metrics::new();
        metrics.record_report_received();
        let _ = metrics.report();

        let summary = metrics.report();
        assert_eq!(summary.reports_received, 1);
        assert_eq!(summary.reports_per_sec, 0.0);
    }
}
