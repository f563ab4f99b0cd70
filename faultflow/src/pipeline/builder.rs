//! Pipeline builder with build-time options validation.

use super::Pipeline;
use crate::errors::ConfigError;
use crate::events::{default_event_sink, EventSink};
use crate::strategies::bulkhead::{BulkheadOptions, BulkheadStrategy};
use crate::strategies::cache::{CacheOptions, CacheStrategy};
use crate::strategies::circuit_breaker::{CircuitBreakerOptions, CircuitBreakerStrategy};
use crate::strategies::fallback::{FallbackOptions, FallbackStrategy};
use crate::strategies::hedging::{HedgingOptions, HedgingStrategy};
use crate::strategies::noop::NoOpStrategy;
use crate::strategies::rate_limit::{RateLimitOptions, RateLimitStrategy};
use crate::strategies::retry::{RetryOptions, RetryStrategy};
use crate::strategies::timeout::{TimeoutOptions, TimeoutStrategy};
use crate::strategies::Strategy;
use crate::time::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// Builds a [`Pipeline`] from strategies added in outer-to-inner order.
///
/// Options are validated when [`build`](Self::build) runs; every
/// violated constraint is reported in one [`ConfigError`]. The builder
/// is consumed by `build`, so it cannot be reused afterwards.
pub struct PipelineBuilder<T> {
    strategies: Vec<Arc<dyn Strategy<T>>>,
    violations: Vec<String>,
    event_sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl<T> PipelineBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            violations: Vec::new(),
            event_sink: default_event_sink(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the event sink handed to every execution context and to
    /// strategies that emit outside an execution (circuit transition
    /// events). Call before adding strategies; already-added strategies
    /// keep the sink they were built with.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Substitutes the clock used by time-dependent strategies. Call
    /// before adding strategies; already-added strategies keep the
    /// clock they were built with.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adds a retry strategy.
    #[must_use]
    pub fn retry(mut self, options: RetryOptions<T>) -> Self {
        options.validate(&mut self.violations);
        self.strategies
            .push(Arc::new(RetryStrategy::new(options).with_clock(self.clock.clone())));
        self
    }

    /// Adds a circuit breaker strategy.
    #[must_use]
    pub fn circuit_breaker(mut self, options: CircuitBreakerOptions<T>) -> Self {
        options.validate(&mut self.violations);
        self.strategies
            .push(Arc::new(CircuitBreakerStrategy::with_clock_and_sink(
                options,
                self.clock.clone(),
                self.event_sink.clone(),
            )));
        self
    }

    /// Adds an optimistic timeout with a fixed deadline.
    #[must_use]
    pub fn timeout(self, deadline: Duration) -> Self {
        self.timeout_options(TimeoutOptions::new(deadline))
    }

    /// Adds a timeout strategy from full options.
    #[must_use]
    pub fn timeout_options(mut self, options: TimeoutOptions) -> Self {
        options.validate(&mut self.violations);
        self.strategies
            .push(Arc::new(TimeoutStrategy::new(options).with_clock(self.clock.clone())));
        self
    }

    /// Adds a bulkhead strategy.
    #[must_use]
    pub fn bulkhead(mut self, options: BulkheadOptions) -> Self {
        options.validate(&mut self.violations);
        self.strategies.push(Arc::new(BulkheadStrategy::new(options)));
        self
    }

    /// Adds a hedging strategy.
    #[must_use]
    pub fn hedging(mut self, options: HedgingOptions<T>) -> Self {
        options.validate(&mut self.violations);
        self.strategies
            .push(Arc::new(HedgingStrategy::new(options).with_clock(self.clock.clone())));
        self
    }

    /// Adds a cache strategy.
    #[must_use]
    pub fn cache(mut self, options: CacheOptions<T>) -> Self {
        options.validate(&mut self.violations);
        self.strategies.push(Arc::new(CacheStrategy::new(options)));
        self
    }

    /// Adds a rate limiter strategy.
    #[must_use]
    pub fn rate_limit(mut self, options: RateLimitOptions) -> Self {
        options.validate(&mut self.violations);
        self.strategies.push(Arc::new(RateLimitStrategy::with_clock(
            options,
            self.clock.clone(),
        )));
        self
    }

    /// Adds a fallback strategy.
    #[must_use]
    pub fn fallback(mut self, options: FallbackOptions<T>) -> Self {
        options.validate(&mut self.violations);
        self.strategies.push(Arc::new(FallbackStrategy::new(options)));
        self
    }

    /// Adds a caller-constructed strategy instance.
    ///
    /// The same instance may appear at most once in a pipeline.
    #[must_use]
    pub fn strategy(mut self, strategy: Arc<dyn Strategy<T>>) -> Self {
        let duplicate = self
            .strategies
            .iter()
            .any(|existing| Arc::ptr_eq(existing, &strategy));
        if duplicate {
            self.violations.push(format!(
                "pipeline: strategy instance '{}' added more than once",
                strategy.name()
            ));
        } else {
            self.strategies.push(strategy);
        }
        self
    }

    /// Returns the number of strategies added so far.
    #[must_use]
    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] listing every violated constraint.
    pub fn build(self) -> Result<Pipeline<T>, ConfigError> {
        if !self.violations.is_empty() {
            return Err(ConfigError::new(self.violations));
        }

        let chain: Vec<Arc<dyn Strategy<T>>> = if self.strategies.is_empty() {
            vec![Arc::new(NoOpStrategy)]
        } else {
            self.strategies
        };

        Ok(Pipeline::new(
            Arc::from(chain.into_boxed_slice()),
            self.event_sink,
        ))
    }
}

impl<T> Default for PipelineBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for PipelineBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("strategies", &self.strategies.len())
            .field("violations", &self.violations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::cache::MemoryCache;

    #[test]
    fn test_empty_builder_yields_noop_pipeline() {
        let pipeline: Pipeline<i32> = PipelineBuilder::new().build().unwrap();
        assert_eq!(pipeline.strategy_count(), 1);
    }

    #[test]
    fn test_single_strategy_pipeline() {
        let pipeline: Pipeline<i32> = PipelineBuilder::new()
            .retry(RetryOptions::new())
            .build()
            .unwrap();
        assert_eq!(pipeline.strategy_count(), 1);
    }

    #[test]
    fn test_full_composition() {
        let pipeline: Pipeline<i32> = PipelineBuilder::new()
            .rate_limit(RateLimitOptions::new(100, Duration::from_secs(1)))
            .retry(RetryOptions::new())
            .circuit_breaker(CircuitBreakerOptions::consecutive(5))
            .timeout(Duration::from_secs(10))
            .bulkhead(BulkheadOptions::new(8).with_max_queuing(16))
            .hedging(HedgingOptions::new(2))
            .cache(CacheOptions::new(
                Arc::new(MemoryCache::new()),
                Duration::from_secs(30),
            ))
            .fallback(FallbackOptions::constant(0))
            .build()
            .unwrap();
        assert_eq!(pipeline.strategy_count(), 8);
    }

    #[test]
    fn test_invalid_options_collected_into_one_error() {
        let result: Result<Pipeline<i32>, _> = PipelineBuilder::new()
            .retry(
                RetryOptions::new()
                    .with_base_delay(Duration::from_secs(10))
                    .with_max_delay(Duration::from_secs(1)),
            )
            .circuit_breaker(
                CircuitBreakerOptions::consecutive(0)
                    .with_break_duration(Duration::from_millis(1)),
            )
            .bulkhead(BulkheadOptions::new(0))
            .build();

        let error = result.unwrap_err();
        assert_eq!(error.violations.len(), 4);
    }

    #[test]
    fn test_duplicate_strategy_instance_rejected() {
        let shared: Arc<dyn Strategy<i32>> = Arc::new(NoOpStrategy);
        let result = PipelineBuilder::new()
            .strategy(shared.clone())
            .strategy(shared)
            .build();

        let error = result.unwrap_err();
        assert_eq!(error.violations.len(), 1);
        assert!(error.violations[0].contains("more than once"));
    }

    #[test]
    fn test_distinct_instances_of_same_type_allowed() {
        let first: Arc<dyn Strategy<i32>> = Arc::new(NoOpStrategy);
        let second: Arc<dyn Strategy<i32>> = Arc::new(NoOpStrategy);
        let pipeline: Pipeline<i32> = PipelineBuilder::new()
            .strategy(first)
            .strategy(second)
            .build()
            .unwrap();
        assert_eq!(pipeline.strategy_count(), 2);
    }
}
