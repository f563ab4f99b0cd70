//! Time and randomness abstractions.
//!
//! Strategies never call the system clock or the global RNG directly;
//! they go through these seams so tests can substitute deterministic
//! implementations.

use async_trait::async_trait;
use rand::Rng;
use std::time::{Duration, Instant};

/// Abstracted clock: current instant plus an awaitable delay.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Sleeps for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// The production clock, backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::time::sleep(duration).await;
    }
}

/// Source of uniform randomness in `[0, 1)` for jitter computation.
pub trait RandomSource: Send + Sync {
    /// Draws the next uniform sample.
    fn next_uniform(&self) -> f64;
}

/// The production randomness source, backed by the thread RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_uniform(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// A fixed randomness source for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_uniform(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_random_in_range() {
        let source = ThreadRandom;
        for _ in 0..100 {
            let sample = source.next_uniform();
            assert!((0.0..1.0).contains(&sample));
        }
    }

    #[test]
    fn test_fixed_random() {
        let source = FixedRandom(0.5);
        assert_eq!(source.next_uniform(), 0.5);
    }

    #[tokio::test]
    async fn test_system_clock_zero_sleep_does_not_await() {
        let clock = SystemClock;
        let start = clock.now();
        clock.sleep(Duration::ZERO).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_system_clock_sleep() {
        let clock = SystemClock;
        let start = Instant::now();
        clock.sleep(Duration::from_millis(20)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
