use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Streaming latency aggregate with bounded memory.
///
/// Count, sum, min and max are exact. Percentiles are estimated from a
/// reservoir of at most `capacity` samples maintained with Algorithm R, so
/// after `n` records every observed value is retained with probability
/// `capacity / n`.
#[derive(Debug)]
pub struct LatencyStats {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    samples: Vec<f64>,
    capacity: usize,
    rng: StdRng,
}

/// End-of-run view of the latency aggregate, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub retained_samples: usize,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

impl LatencyStats {
    pub fn new(capacity: usize) -> Self {
        Self::with_rng(capacity, StdRng::from_entropy())
    }

    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }

    fn with_rng(capacity: usize, rng: StdRng) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            samples: Vec::with_capacity(capacity.min(65_536)),
            capacity,
            rng,
        }
    }

    /// Record one latency. Negative and non-finite values are ignored and
    /// `false` is returned.
    pub fn record_latency(&mut self, latency_ms: f64) -> bool {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return false;
        }

        self.count += 1;
        self.sum += latency_ms;
        self.min = self.min.min(latency_ms);
        self.max = self.max.max(latency_ms);

        if self.samples.len() < self.capacity {
            self.samples.push(latency_ms);
        } else {
            let replace_index = self.rng.gen_range(0..self.count);
            // Algorithm R: keep the new value with probability capacity / count.
            if replace_index < self.capacity as u64 {
                self.samples[replace_index as usize] = latency_ms;
            }
        }
        true
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn percentile(&self, percentile: f64) -> f64 {
        let sorted = self.sorted_samples();
        pick_percentile(&sorted, percentile)
    }

    /// `None` until at least one latency has been recorded.
    pub fn snapshot(&self) -> Option<LatencySummary> {
        if self.count == 0 {
            return None;
        }

        let sorted = self.sorted_samples();
        Some(LatencySummary {
            count: self.count,
            retained_samples: sorted.len(),
            avg_ms: self.sum / self.count as f64,
            min_ms: self.min,
            max_ms: self.max,
            p50_ms: pick_percentile(&sorted, 0.50),
            p90_ms: pick_percentile(&sorted, 0.90),
            p99_ms: pick_percentile(&sorted, 0.99),
        })
    }

    fn sorted_samples(&self) -> Vec<f64> {
        let mut sorted = self.samples.clone();
        sorted.sort_by(f64::total_cmp);
        sorted
    }
}

/// Nearest-rank pick on an ascending slice; 0 for an empty slice.
pub fn pick_percentile(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let last = sorted.len() - 1;
    let rank = (percentile * last as f64).round();
    let index = if rank.is_nan() || rank <= 0.0 {
        0
    } else {
        (rank as usize).min(last)
    };
    sorted[index]
}

/// Thread-safe recorder shared by every session of a run.
///
/// The reservoir branch reads the count, draws and writes a slot; the mutex
/// keeps that sequence atomic across worker threads.
#[derive(Debug)]
pub struct LatencyRecorder {
    inner: Mutex<LatencyStats>,
}

impl LatencyRecorder {
    pub fn new(capacity: usize) -> Self {
        Self::from_stats(LatencyStats::new(capacity))
    }

    pub fn from_stats(stats: LatencyStats) -> Self {
        Self {
            inner: Mutex::new(stats),
        }
    }

    /// Record the latency of a message stamped at `observed_ms` (epoch millis),
    /// measured against the current wall clock.
    pub fn record(&self, observed_ms: f64) -> bool {
        self.record_at(observed_ms, now_epoch_ms())
    }

    pub fn record_at(&self, observed_ms: f64, now_ms: f64) -> bool {
        self.record_latency(now_ms - observed_ms)
    }

    pub fn record_latency(&self, latency_ms: f64) -> bool {
        self.inner.lock().record_latency(latency_ms)
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().count()
    }

    pub fn percentile(&self, percentile: f64) -> f64 {
        self.inner.lock().percentile(percentile)
    }

    pub fn snapshot(&self) -> Option<LatencySummary> {
        self.inner.lock().snapshot()
    }
}

pub fn now_epoch_ms() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}
