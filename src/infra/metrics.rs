//! Lock-free capture metrics and periodic reporting
//!
//! Uses atomics so the control task never contends with the reporter.
//!
//! NOTE: All atomics use Relaxed ordering; these are statistical
//! counters only. Sequence indices live in `CaptureSession`, never here.

use crate::domain::types::AgentRole;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Capture latency bucket boundaries (microseconds)
/// Buckets: ≤1ms, ≤2ms, ≤4ms ... ≤512ms, >512ms
const BUCKET_BOUNDS: [u64; 10] =
    [1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 64_000, 128_000, 256_000, 512_000];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] = [
        1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 64_000, 128_000, 256_000, 512_000, 1_024_000,
    ];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

#[inline]
fn role_slot(role: AgentRole) -> usize {
    match role {
        AgentRole::Aerial => 0,
        AgentRole::Ground => 1,
    }
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Gate evaluations (monotonic)
    ticks_total: AtomicU64,
    /// Gate evaluations that fired (monotonic)
    captures_total: AtomicU64,
    /// Gate evaluations since last report (reset on report)
    ticks_since_report: AtomicU64,
    /// Images written per role (monotonic)
    images_written: [AtomicU64; 2],
    /// Image bytes written (monotonic)
    image_bytes_total: AtomicU64,
    /// Capture latency histogram, fire to last frame written (reset on report)
    capture_latency_buckets: [AtomicU64; NUM_BUCKETS],
    capture_latency_sum_us: AtomicU64,
    capture_latency_max_us: AtomicU64,
    /// Trajectory rows written by the sampler (monotonic)
    samples_total: AtomicU64,
    /// Agent path commands that reported a fault (monotonic)
    path_faults_total: AtomicU64,
    /// Agent path commands that completed (monotonic)
    paths_completed_total: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            captures_total: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            images_written: std::array::from_fn(|_| AtomicU64::new(0)),
            image_bytes_total: AtomicU64::new(0),
            capture_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            capture_latency_sum_us: AtomicU64::new(0),
            capture_latency_max_us: AtomicU64::new(0),
            samples_total: AtomicU64::new(0),
            path_faults_total: AtomicU64::new(0),
            paths_completed_total: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a gate evaluation that did not fire
    #[inline]
    pub fn record_tick_skipped(&self) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a gate evaluation that fired and completed in `latency_us`
    #[inline]
    pub fn record_capture(&self, latency_us: u64) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
        self.captures_total.fetch_add(1, Ordering::Relaxed);
        self.capture_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.capture_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.capture_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_image_written(&self, role: AgentRole, bytes: usize) {
        self.images_written[role_slot(role)].fetch_add(1, Ordering::Relaxed);
        self.image_bytes_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sample(&self) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_path_completed(&self) {
        self.paths_completed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_path_fault(&self) {
        self.path_faults_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn captures_total(&self) -> u64 {
        self.captures_total.load(Ordering::Relaxed)
    }

    pub fn images_written(&self, role: AgentRole) -> u64 {
        self.images_written[role_slot(role)].load(Ordering::Relaxed)
    }

    pub fn samples_total(&self) -> u64 {
        self.samples_total.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let ticks_count = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.capture_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.capture_latency_max_us.swap(0, Ordering::Relaxed);
        let latency_buckets = swap_buckets(&self.capture_latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let ticks_per_sec = if elapsed.as_secs_f64() > 0.0 {
            ticks_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let captures_in_window: u64 = latency_buckets.iter().sum();
        let capture_latency_avg_us =
            if captures_in_window > 0 { latency_sum / captures_in_window } else { 0 };

        MetricsSummary {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            ticks_per_sec,
            captures_total: self.captures_total.load(Ordering::Relaxed),
            aerial_images: self.images_written(AgentRole::Aerial),
            ground_images: self.images_written(AgentRole::Ground),
            image_bytes_total: self.image_bytes_total.load(Ordering::Relaxed),
            capture_latency_buckets: latency_buckets,
            capture_latency_avg_us,
            capture_latency_max_us: latency_max,
            capture_latency_p99_us: percentile_from_buckets(&latency_buckets, 0.99),
            samples_total: self.samples_total(),
            paths_completed_total: self.paths_completed_total.load(Ordering::Relaxed),
            path_faults_total: self.path_faults_total.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub ticks_total: u64,
    pub ticks_per_sec: f64,
    pub captures_total: u64,
    pub aerial_images: u64,
    pub ground_images: u64,
    pub image_bytes_total: u64,
    /// Bounds: ≤1ms ... ≤512ms, >512ms (µs)
    pub capture_latency_buckets: [u64; NUM_BUCKETS],
    pub capture_latency_avg_us: u64,
    pub capture_latency_max_us: u64,
    pub capture_latency_p99_us: u64,
    pub samples_total: u64,
    pub paths_completed_total: u64,
    pub path_faults_total: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            ticks_total = %self.ticks_total,
            ticks_per_sec = format!("{:.1}", self.ticks_per_sec),
            captures_total = %self.captures_total,
            aerial_images = %self.aerial_images,
            ground_images = %self.ground_images,
            image_bytes = %self.image_bytes_total,
            capture_avg_us = %self.capture_latency_avg_us,
            capture_p99_us = %self.capture_latency_p99_us,
            samples_total = %self.samples_total,
            path_faults = %self.path_faults_total,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.captures_total(), 0);
        assert_eq!(metrics.images_written(AgentRole::Aerial), 0);
    }

    #[test]
    fn test_record_capture_and_skip() {
        let metrics = Metrics::new();
        metrics.record_capture(1500);
        metrics.record_tick_skipped();
        metrics.record_tick_skipped();

        let summary = metrics.report();
        assert_eq!(summary.ticks_total, 3);
        assert_eq!(summary.captures_total, 1);
        assert_eq!(summary.capture_latency_avg_us, 1500);
        assert_eq!(summary.capture_latency_buckets[1], 1);
    }

    #[test]
    fn test_report_resets_periodic_counters() {
        let metrics = Metrics::new();
        metrics.record_capture(700);
        metrics.record_capture(90_000);
        let first = metrics.report();
        assert_eq!(first.capture_latency_max_us, 90_000);

        let second = metrics.report();
        assert_eq!(second.capture_latency_max_us, 0);
        assert_eq!(second.capture_latency_avg_us, 0);
        // Monotonic counters survive
        assert_eq!(second.captures_total, 2);
    }

    #[test]
    fn test_images_per_role() {
        let metrics = Metrics::new();
        metrics.record_image_written(AgentRole::Ground, 100);
        metrics.record_image_written(AgentRole::Ground, 100);
        metrics.record_image_written(AgentRole::Aerial, 50);
        let summary = metrics.report();
        assert_eq!(summary.ground_images, 2);
        assert_eq!(summary.aerial_images, 1);
        assert_eq!(summary.image_bytes_total, 250);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(1_000), 0);
        assert_eq!(bucket_index(1_001), 1);
        assert_eq!(bucket_index(512_000), 9);
        assert_eq!(bucket_index(512_001), 10);
    }

    #[test]
    fn test_percentile_computation() {
        let metrics = Metrics::new();
        for _ in 0..100 {
            metrics.record_capture(1_500);
        }
        let summary = metrics.report();
        assert_eq!(summary.capture_latency_p99_us, 2_000);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    m.record_sample();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.samples_total(), 4_000);
    }
}
