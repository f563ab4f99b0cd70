//! Failure statistics backing the circuit breaker's trip decision.

use std::time::{Duration, Instant};

/// Aggregated counts over the live sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HealthSnapshot {
    pub total: u64,
    pub handled: u64,
}

/// Tracks outcomes and answers "should the circuit trip?".
///
/// Two flavors: a consecutive-failure counter and a rolling sampling
/// window of fixed-width buckets.
#[derive(Debug)]
pub(crate) enum HealthTracker {
    Consecutive {
        threshold: usize,
        failures: usize,
    },
    Sampling(SamplingWindow),
}

impl HealthTracker {
    pub(crate) fn consecutive(threshold: usize) -> Self {
        Self::Consecutive {
            threshold,
            failures: 0,
        }
    }

    pub(crate) fn sampling(
        failure_threshold: f64,
        minimum_throughput: usize,
        sampling_duration: Duration,
        buckets: usize,
        now: Instant,
    ) -> Self {
        Self::Sampling(SamplingWindow::new(
            failure_threshold,
            minimum_throughput,
            sampling_duration,
            buckets,
            now,
        ))
    }

    /// Records one outcome.
    pub(crate) fn record(&mut self, handled: bool, now: Instant) {
        match self {
            Self::Consecutive { failures, .. } => {
                if handled {
                    *failures += 1;
                } else {
                    *failures = 0;
                }
            }
            Self::Sampling(window) => window.record(handled, now),
        }
    }

    /// Returns true if the statistics warrant opening the circuit.
    pub(crate) fn should_trip(&mut self, now: Instant) -> bool {
        match self {
            Self::Consecutive {
                threshold,
                failures,
            } => *failures >= *threshold,
            Self::Sampling(window) => window.should_trip(now),
        }
    }

    /// Clears all statistics (circuit closed).
    pub(crate) fn reset(&mut self, now: Instant) {
        match self {
            Self::Consecutive { failures, .. } => *failures = 0,
            Self::Sampling(window) => window.reset(now),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    total: u64,
    handled: u64,
}

/// A rolling window of `buckets.len()` fixed-width buckets spanning the
/// sampling duration. Bucket rotation uses floor division of elapsed
/// time; rotating past a bucket evicts its counts.
#[derive(Debug)]
pub(crate) struct SamplingWindow {
    failure_threshold: f64,
    minimum_throughput: usize,
    bucket_width: Duration,
    buckets: Vec<Bucket>,
    current: usize,
    current_start: Instant,
}

impl SamplingWindow {
    fn new(
        failure_threshold: f64,
        minimum_throughput: usize,
        sampling_duration: Duration,
        buckets: usize,
        now: Instant,
    ) -> Self {
        let count = buckets.max(1);
        Self {
            failure_threshold,
            minimum_throughput,
            bucket_width: sampling_duration / count as u32,
            buckets: vec![Bucket::default(); count],
            current: 0,
            current_start: now,
        }
    }

    fn rotate(&mut self, now: Instant) {
        if self.bucket_width.is_zero() {
            return;
        }
        let elapsed = now.saturating_duration_since(self.current_start);
        let steps = (elapsed.as_nanos() / self.bucket_width.as_nanos()) as u64;
        if steps == 0 {
            return;
        }
        if steps >= self.buckets.len() as u64 {
            // The whole window went stale.
            for bucket in &mut self.buckets {
                *bucket = Bucket::default();
            }
            self.current_start = now;
            return;
        }
        for _ in 0..steps {
            self.current = (self.current + 1) % self.buckets.len();
            self.buckets[self.current] = Bucket::default();
        }
        self.current_start += self.bucket_width * steps as u32;
    }

    fn record(&mut self, handled: bool, now: Instant) {
        self.rotate(now);
        let bucket = &mut self.buckets[self.current];
        bucket.total += 1;
        if handled {
            bucket.handled += 1;
        }
    }

    fn snapshot(&mut self, now: Instant) -> HealthSnapshot {
        self.rotate(now);
        let mut snapshot = HealthSnapshot {
            total: 0,
            handled: 0,
        };
        for bucket in &self.buckets {
            snapshot.total += bucket.total;
            snapshot.handled += bucket.handled;
        }
        snapshot
    }

    fn should_trip(&mut self, now: Instant) -> bool {
        let snapshot = self.snapshot(now);
        if (snapshot.total as usize) < self.minimum_throughput || snapshot.total == 0 {
            return false;
        }
        let ratio = snapshot.handled as f64 / snapshot.total as f64;
        ratio >= self.failure_threshold
    }

    fn reset(&mut self, now: Instant) {
        for bucket in &mut self.buckets {
            *bucket = Bucket::default();
        }
        self.current = 0;
        self.current_start = now;
    }
}
