//! Internal run metrics.
//!
//! Counters accumulate over a process lifetime; the binary logs a snapshot
//! at the end of each run. Pipeline results never read these back, they are
//! observability only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// Histogram for stage latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    /// Records the time elapsed since `started`.
    pub fn observe_since(&self, started: Instant) {
        self.observe(started.elapsed().as_millis() as u64);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the analysis engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Loader metrics
    pub demographic_rows_loaded: Counter,
    pub web_event_rows_loaded: Counter,
    pub assignment_rows_loaded: Counter,
    pub rows_rejected: Counter,
    pub unknown_steps: Counter,
    pub invalid_timestamps: Counter,

    // Merge metrics
    pub demographics_dropped_nulls: Counter,
    pub records_merged: Counter,
    pub records_dropped_unassigned: Counter,
    pub records_dropped_conflicting_visit: Counter,

    // Analysis metrics
    pub events_derived: Counter,
    pub negative_durations: Counter,
    pub sessions_reconstructed: Counter,
    pub statistical_tests_run: Counter,
    pub statistical_tests_undetermined: Counter,

    // Stage latency histograms
    pub load_latency_ms: Histogram,
    pub merge_latency_ms: Histogram,
    pub reconstruction_latency_ms: Histogram,
    pub analysis_latency_ms: Histogram,
    pub write_latency_ms: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub demographic_rows_loaded: u64,
    pub web_event_rows_loaded: u64,
    pub assignment_rows_loaded: u64,
    pub rows_rejected: u64,
    pub unknown_steps: u64,
    pub invalid_timestamps: u64,
    pub demographics_dropped_nulls: u64,
    pub records_merged: u64,
    pub records_dropped_unassigned: u64,
    pub records_dropped_conflicting_visit: u64,
    pub events_derived: u64,
    pub negative_durations: u64,
    pub sessions_reconstructed: u64,
    pub statistical_tests_run: u64,
    pub statistical_tests_undetermined: u64,
    pub load_latency_mean_ms: f64,
    pub merge_latency_mean_ms: f64,
    pub reconstruction_latency_mean_ms: f64,
    pub analysis_latency_mean_ms: f64,
    pub write_latency_mean_ms: f64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            demographic_rows_loaded: self.demographic_rows_loaded.get(),
            web_event_rows_loaded: self.web_event_rows_loaded.get(),
            assignment_rows_loaded: self.assignment_rows_loaded.get(),
            rows_rejected: self.rows_rejected.get(),
            unknown_steps: self.unknown_steps.get(),
            invalid_timestamps: self.invalid_timestamps.get(),
            demographics_dropped_nulls: self.demographics_dropped_nulls.get(),
            records_merged: self.records_merged.get(),
            records_dropped_unassigned: self.records_dropped_unassigned.get(),
            records_dropped_conflicting_visit: self.records_dropped_conflicting_visit.get(),
            events_derived: self.events_derived.get(),
            negative_durations: self.negative_durations.get(),
            sessions_reconstructed: self.sessions_reconstructed.get(),
            statistical_tests_run: self.statistical_tests_run.get(),
            statistical_tests_undetermined: self.statistical_tests_undetermined.get(),
            load_latency_mean_ms: self.load_latency_ms.mean(),
            merge_latency_mean_ms: self.merge_latency_ms.mean(),
            reconstruction_latency_mean_ms: self.reconstruction_latency_ms.mean(),
            analysis_latency_mean_ms: self.analysis_latency_ms.mean(),
            write_latency_mean_ms: self.write_latency_ms.mean(),
        }
    }
}

impl MetricsSnapshot {
    /// Renders the snapshot as a single JSON line for logging.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
