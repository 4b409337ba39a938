//! Advisory request/latency telemetry. None of this is load-bearing for
//! correctness — the cache's own `stats()` and the consensus log are the
//! sources of truth; this module only answers "how is the server doing."

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Upper bound (in microseconds) of each latency bucket. A request whose
/// latency exceeds the last bound falls into an implicit overflow bucket.
const BUCKET_BOUNDS_US: &[u64] = &[100, 250, 500, 1_000, 2_500, 5_000, 10_000, 50_000, 100_000];

pub struct LatencyHistogram {
    bounds_us: &'static [u64],
    buckets: Vec<AtomicU64>,
    sum_us: AtomicU64,
    samples: AtomicU64,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        let buckets = (0..=BUCKET_BOUNDS_US.len()).map(|_| AtomicU64::new(0)).collect();
        LatencyHistogram {
            bounds_us: BUCKET_BOUNDS_US,
            buckets,
            sum_us: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    pub fn record(&self, elapsed: std::time::Duration) {
        let us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        let bucket = self
            .bounds_us
            .iter()
            .position(|&bound| us <= bound)
            .unwrap_or(self.bounds_us.len());
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(us, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LatencyHistogramSnapshot {
        LatencyHistogramSnapshot {
            bucket_bounds_us: self.bounds_us.to_vec(),
            bucket_counts: self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect(),
            sum_us: self.sum_us.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct LatencyHistogramSnapshot {
    pub bucket_bounds_us: Vec<u64>,
    pub bucket_counts: Vec<u64>,
    pub sum_us: u64,
    pub samples: u64,
}

impl LatencyHistogramSnapshot {
    pub fn mean_us(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.sum_us as f64 / self.samples as f64
        }
    }
}

pub struct Metrics {
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    inflight: AtomicU64,
    latency: LatencyHistogram,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            inflight: AtomicU64::new(0),
            latency: LatencyHistogram::new(),
        }
    }

    pub fn record_request_start(&self) -> Instant {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.inflight.fetch_add(1, Ordering::Relaxed);
        Instant::now()
    }

    pub fn record_request_end(&self, start: Instant) {
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        self.latency.record(start.elapsed());
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
            latency: self.latency.snapshot(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub errors_total: u64,
    pub inflight: u64,
    pub latency: LatencyHistogramSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn histogram_buckets_small_and_large_latencies() {
        let h = LatencyHistogram::new();
        h.record(Duration::from_micros(50));
        h.record(Duration::from_micros(200_000));
        let snap = h.snapshot();
        assert_eq!(snap.samples, 2);
        assert_eq!(snap.bucket_counts[0], 1); // falls in first bucket (<=100us)
        assert_eq!(*snap.bucket_counts.last().unwrap(), 1); // overflow bucket
    }

    #[test]
    fn metrics_tracks_inflight_and_errors() {
        let m = Metrics::new();
        let start = m.record_request_start();
        assert_eq!(m.snapshot().inflight, 1);
        m.record_error();
        m.record_request_end(start);
        let snap = m.snapshot();
        assert_eq!(snap.inflight, 0);
        assert_eq!(snap.requests_total, 1);
        assert_eq!(snap.errors_total, 1);
        assert_eq!(snap.latency.samples, 1);
    }
}
