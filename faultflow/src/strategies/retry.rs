//! Retry strategy with configurable backoff and decorrelated jitter.

use super::{Next, Strategy};
use crate::context::ExecutionContext;
use crate::errors::FaultError;
use crate::outcome::Outcome;
use crate::predicate::{handle_exceptions, Predicate};
use crate::time::{Clock, RandomSource, SystemClock, ThreadRandom};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backoff {
    /// delay = base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// delay = base * attempt
    Linear,
    /// delay = base
    Constant,
}

/// Details passed to the retry hook before each re-invocation.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    /// The retry attempt about to run (1 = first retry).
    pub attempt: usize,
    /// The delay that was awaited before this attempt.
    pub delay: Duration,
    /// Description of the handled outcome that triggered the retry.
    pub outcome: String,
}

/// Hook invoked once per retry.
pub type RetryHook = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

/// Configuration for the retry strategy.
#[derive(Clone)]
pub struct RetryOptions<T> {
    /// Maximum number of retries. `Some(0)` disables retrying, `None`
    /// retries without bound.
    pub max_retries: Option<usize>,
    /// Base delay fed into the backoff formula.
    pub base_delay: Duration,
    /// Backoff strategy.
    pub backoff: Backoff,
    /// Cap applied to every computed delay.
    pub max_delay: Duration,
    /// Applies decorrelated jitter: `uniform(base, min(max, prev * 3))`.
    pub jitter: bool,
    /// Decides which outcomes trigger a retry.
    pub should_handle: Predicate<T>,
    /// Invoked after each backoff delay, before the next attempt.
    pub on_retry: Option<RetryHook>,
}

impl<T> RetryOptions<T> {
    /// Creates options with the default posture: three exponential
    /// retries from one second, capped at thirty, with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_retries: Some(3),
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Exponential,
            max_delay: Duration::from_secs(30),
            jitter: true,
            should_handle: handle_exceptions(),
            on_retry: None,
        }
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Removes the retry budget entirely.
    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.max_retries = None;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the handled-outcome predicate.
    #[must_use]
    pub fn with_should_handle(mut self, predicate: Predicate<T>) -> Self {
        self.should_handle = predicate;
        self
    }

    /// Sets the retry hook.
    #[must_use]
    pub fn with_on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub(crate) fn validate(&self, violations: &mut Vec<String>) {
        if self.max_delay < self.base_delay {
            violations.push(format!(
                "retry: max_delay ({:?}) must not be below base_delay ({:?})",
                self.max_delay, self.base_delay
            ));
        }
        if self.jitter && self.base_delay.is_zero() {
            // Decorrelated jitter draws from [base, min(max, prev * 3)];
            // a zero base pins every delay at zero.
            violations.push(
                "retry: base_delay must be positive when jitter is enabled".to_string(),
            );
        }
    }
}

impl<T> Default for RetryOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Retries handled outcomes with backoff until the budget is exhausted.
pub struct RetryStrategy<T> {
    options: RetryOptions<T>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl<T> RetryStrategy<T> {
    /// Creates a retry strategy with the production clock and RNG.
    #[must_use]
    pub fn new(options: RetryOptions<T>) -> Self {
        Self {
            options,
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
        }
    }

    /// Substitutes the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Substitutes the randomness source.
    #[must_use]
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    fn delay_for(&self, attempt: usize, prev_delay: &mut Duration) -> Duration {
        let base = self.options.base_delay;
        let max = self.options.max_delay;

        if self.options.jitter {
            // Decorrelated jitter: uniform(base, min(max, prev * 3)).
            let upper = max.min(prev_delay.saturating_mul(3)).max(base);
            let span = upper.saturating_sub(base);
            let sample = span.mul_f64(self.random.next_uniform());
            let delay = base + sample;
            *prev_delay = delay;
            return delay;
        }

        let raw = match self.options.backoff {
            Backoff::Constant => base,
            Backoff::Linear => base.saturating_mul(attempt as u32),
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1) as u32);
                base.saturating_mul(factor)
            }
        };
        raw.min(max)
    }
}

#[async_trait]
impl<T> Strategy<T> for RetryStrategy<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn execute(&self, ctx: Arc<ExecutionContext>, next: Next<T>) -> Outcome<T> {
        let mut attempt = 0usize;
        let mut prev_delay = self.options.base_delay;

        loop {
            let outcome = next.run(ctx.clone()).await;

            if !(self.options.should_handle)(&outcome) {
                return outcome;
            }
            if let Some(max) = self.options.max_retries {
                if attempt >= max {
                    return outcome;
                }
            }

            attempt += 1;
            let delay = self.delay_for(attempt, &mut prev_delay);

            if !delay.is_zero() {
                tokio::select! {
                    () = self.clock.sleep(delay) => {}
                    () = ctx.cancellation().cancelled() => {
                        return Outcome::Exception(FaultError::canceled(
                            ctx.cancellation().reason(),
                        ));
                    }
                }
            }

            let description = outcome.describe();
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                outcome = %description,
                "retrying after handled outcome"
            );
            if let Some(hook) = &self.options.on_retry {
                hook(&RetryEvent {
                    attempt,
                    delay,
                    outcome: description.clone(),
                });
            }
            ctx.try_emit_event(
                "retry.attempt",
                Some(serde_json::json!({
                    "attempt": attempt,
                    "delay_ms": delay.as_millis() as u64,
                    "outcome": description,
                })),
            );
        }
    }
}
