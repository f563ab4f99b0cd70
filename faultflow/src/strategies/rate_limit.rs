//! Token-bucket rate limiter strategy.

use super::{Next, Strategy};
use crate::context::ExecutionContext;
use crate::errors::FaultError;
use crate::outcome::Outcome;
use crate::time::{Clock, SystemClock};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration for the rate limiter strategy.
#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    /// Permits replenished per period.
    pub permits_per_period: u32,
    /// The replenishment period.
    pub period: Duration,
    /// Bucket capacity; allows short bursts above the steady rate.
    pub burst: u32,
}

impl RateLimitOptions {
    /// Creates options with burst equal to the per-period permits.
    #[must_use]
    pub fn new(permits_per_period: u32, period: Duration) -> Self {
        Self {
            permits_per_period,
            period,
            burst: permits_per_period,
        }
    }

    /// Sets the burst capacity.
    #[must_use]
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    pub(crate) fn validate(&self, violations: &mut Vec<String>) {
        if self.permits_per_period == 0 {
            violations.push("rate limit: permits_per_period must be at least 1".to_string());
        }
        if self.period.is_zero() {
            violations.push("rate limit: period must be positive".to_string());
        }
        if self.burst == 0 {
            violations.push("rate limit: burst must be at least 1".to_string());
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Rejects calls once the token bucket is drained.
///
/// Refill is computed lazily from elapsed time under a mutex; no
/// background task is needed.
pub struct RateLimitStrategy {
    options: RateLimitOptions,
    bucket: Mutex<Bucket>,
    clock: Arc<dyn Clock>,
}

impl RateLimitStrategy {
    /// Creates a rate limiter with a full bucket.
    #[must_use]
    pub fn new(options: RateLimitOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Creates a rate limiter with an injected clock.
    #[must_use]
    pub fn with_clock(options: RateLimitOptions, clock: Arc<dyn Clock>) -> Self {
        let bucket = Bucket {
            tokens: f64::from(options.burst),
            last_refill: clock.now(),
        };
        Self {
            options,
            bucket: Mutex::new(bucket),
            clock,
        }
    }

    fn try_take(&self) -> bool {
        let mut bucket = self.bucket.lock();
        let now = self.clock.now();

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let rate =
            f64::from(self.options.permits_per_period) / self.options.period.as_secs_f64();
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * rate).min(f64::from(self.options.burst));
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl<T> Strategy<T> for RateLimitStrategy
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn execute(&self, ctx: Arc<ExecutionContext>, next: Next<T>) -> Outcome<T> {
        if !self.try_take() {
            ctx.try_emit_event("rate_limit.rejected", None);
            tracing::debug!("rate limiter rejected call");
            return Outcome::Exception(FaultError::RateLimited);
        }
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{context_from, ContextOptions};
    use crate::strategies::Operation;
    use crate::testing::ScriptedOperation;

    fn run_next<T: Clone + Send + Sync + 'static>(op: Operation<T>) -> Next<T> {
        Next::new(Arc::from(Vec::new().into_boxed_slice()), op)
    }

    #[tokio::test]
    async fn test_burst_then_rejection() {
        let strategy =
            RateLimitStrategy::new(RateLimitOptions::new(1, Duration::from_secs(60)).with_burst(2));
        let op = ScriptedOperation::succeeding(1);
        let ctx = context_from(ContextOptions::new());

        for _ in 0..2 {
            let outcome = strategy
                .execute(ctx.clone(), run_next(op.operation()))
                .await;
            assert!(outcome.is_result());
        }

        let outcome = strategy.execute(ctx, run_next(op.operation())).await;
        assert!(matches!(
            outcome.exception(),
            Some(FaultError::RateLimited)
        ));
        assert_eq!(op.call_count(), 2);
    }

    #[tokio::test]
    async fn test_refill_restores_permits() {
        let strategy = RateLimitStrategy::new(
            RateLimitOptions::new(10, Duration::from_millis(100)).with_burst(1),
        );
        let op = ScriptedOperation::succeeding(1);
        let ctx = context_from(ContextOptions::new());

        assert!(strategy
            .execute(ctx.clone(), run_next(op.operation()))
            .await
            .is_result());
        assert!(strategy
            .execute(ctx.clone(), run_next(op.operation()))
            .await
            .is_exception());

        // One permit refills every 10ms at this rate.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(strategy
            .execute(ctx, run_next(op.operation()))
            .await
            .is_result());
    }

    #[test]
    fn test_validation() {
        let mut violations = Vec::new();
        RateLimitOptions::new(0, Duration::ZERO)
            .with_burst(0)
            .validate(&mut violations);
        assert_eq!(violations.len(), 3);
    }
}
