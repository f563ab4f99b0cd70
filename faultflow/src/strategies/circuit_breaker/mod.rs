//! Circuit breaker strategy.
//!
//! Two flavors share one controller: a consecutive-failure breaker and
//! a rolling-window breaker that trips on failure ratio over a sampling
//! window. See [`TripSpec`].

mod controller;
mod health;
mod manual;

pub use controller::{
    Admission, BreakerController, TransitionEvent, TransitionHook, TransitionHooks,
};
pub use manual::{ManualControl, StateView};

use super::{Next, Strategy};
use crate::context::ExecutionContext;
use crate::errors::FaultError;
use crate::events::{default_event_sink, EventSink};
use crate::outcome::Outcome;
use crate::predicate::{handle_exceptions, Predicate};
use crate::time::{Clock, SystemClock};
use async_trait::async_trait;
use health::HealthTracker;
use std::sync::Arc;
use std::time::Duration;

/// The observable states of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow through; statistics accumulate.
    Closed,
    /// Calls are rejected until the break timer expires.
    Open,
    /// One probe is admitted to test recovery.
    HalfOpen,
    /// Manually held open; calls rejected until manually closed.
    Isolated,
}

/// What trips the circuit.
#[derive(Debug, Clone, Copy)]
pub enum TripSpec {
    /// Open after this many consecutive handled outcomes.
    ConsecutiveFailures(usize),
    /// Open when, over a rolling window, throughput and failure ratio
    /// both cross their thresholds.
    FailureRatio {
        /// Handled/total ratio in `(0, 1]` that trips the circuit.
        failure_threshold: f64,
        /// Minimum calls in the window before the ratio is considered.
        minimum_throughput: usize,
        /// Width of the rolling window.
        sampling_duration: Duration,
        /// Number of fixed-width buckets partitioning the window.
        buckets: usize,
    },
}

/// Configuration for the circuit breaker strategy.
#[derive(Clone)]
pub struct CircuitBreakerOptions<T> {
    /// The trip condition.
    pub trip: TripSpec,
    /// How long the circuit stays open before admitting a probe.
    pub break_duration: Duration,
    /// Decides which outcomes count as failures.
    pub should_handle: Predicate<T>,
    /// Transition hooks, delivered in transition order.
    pub hooks: TransitionHooks,
    /// Optional manual control handle to attach.
    pub manual_control: Option<Arc<ManualControl>>,
}

impl<T> CircuitBreakerOptions<T> {
    /// A consecutive-failure breaker with a five second break.
    #[must_use]
    pub fn consecutive(failures: usize) -> Self {
        Self {
            trip: TripSpec::ConsecutiveFailures(failures),
            break_duration: Duration::from_secs(5),
            should_handle: handle_exceptions(),
            hooks: TransitionHooks::default(),
            manual_control: None,
        }
    }

    /// A rolling-window breaker with ten buckets and a five second
    /// break.
    #[must_use]
    pub fn sampling(
        failure_threshold: f64,
        minimum_throughput: usize,
        sampling_duration: Duration,
    ) -> Self {
        Self {
            trip: TripSpec::FailureRatio {
                failure_threshold,
                minimum_throughput,
                sampling_duration,
                buckets: 10,
            },
            break_duration: Duration::from_secs(5),
            should_handle: handle_exceptions(),
            hooks: TransitionHooks::default(),
            manual_control: None,
        }
    }

    /// Sets the break duration.
    #[must_use]
    pub fn with_break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }

    /// Sets the handled-outcome predicate.
    #[must_use]
    pub fn with_should_handle(mut self, predicate: Predicate<T>) -> Self {
        self.should_handle = predicate;
        self
    }

    /// Sets the hook fired when the circuit opens or is isolated.
    #[must_use]
    pub fn with_on_opened<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.hooks.on_opened = Some(Arc::new(hook));
        self
    }

    /// Sets the hook fired when the circuit closes.
    #[must_use]
    pub fn with_on_closed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.hooks.on_closed = Some(Arc::new(hook));
        self
    }

    /// Sets the hook fired when the circuit half-opens.
    #[must_use]
    pub fn with_on_half_opened<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.hooks.on_half_opened = Some(Arc::new(hook));
        self
    }

    /// Attaches a manual control handle.
    #[must_use]
    pub fn with_manual_control(mut self, control: Arc<ManualControl>) -> Self {
        self.manual_control = Some(control);
        self
    }

    pub(crate) fn validate(&self, violations: &mut Vec<String>) {
        const MIN_BREAK: Duration = Duration::from_millis(500);
        const MAX_BREAK: Duration = Duration::from_secs(24 * 60 * 60);
        const MIN_SAMPLING: Duration = Duration::from_millis(500);

        if self.break_duration < MIN_BREAK || self.break_duration > MAX_BREAK {
            violations.push(format!(
                "circuit breaker: break_duration ({:?}) must be within [500ms, 1d]",
                self.break_duration
            ));
        }
        match self.trip {
            TripSpec::ConsecutiveFailures(failures) => {
                if failures < 1 {
                    violations
                        .push("circuit breaker: failure count must be at least 1".to_string());
                }
            }
            TripSpec::FailureRatio {
                failure_threshold,
                minimum_throughput,
                sampling_duration,
                buckets,
            } => {
                if !(failure_threshold > 0.0 && failure_threshold <= 1.0) {
                    violations.push(format!(
                        "circuit breaker: failure_threshold ({failure_threshold}) must be in (0, 1]"
                    ));
                }
                if minimum_throughput < 2 {
                    violations.push(format!(
                        "circuit breaker: minimum_throughput ({minimum_throughput}) must be at least 2"
                    ));
                }
                if sampling_duration < MIN_SAMPLING {
                    violations.push(format!(
                        "circuit breaker: sampling_duration ({sampling_duration:?}) must be at least 500ms"
                    ));
                }
                if buckets < 10 {
                    violations.push(format!(
                        "circuit breaker: buckets ({buckets}) must be at least 10"
                    ));
                }
            }
        }
    }
}

/// Rejects calls while its shared controller holds the circuit open.
pub struct CircuitBreakerStrategy<T> {
    controller: Arc<BreakerController>,
    should_handle: Predicate<T>,
    manual: Option<Arc<ManualControl>>,
}

impl<T> CircuitBreakerStrategy<T> {
    /// Creates a breaker with the production clock.
    #[must_use]
    pub fn new(options: CircuitBreakerOptions<T>) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Creates a breaker with an injected clock and the process-default
    /// event sink.
    #[must_use]
    pub fn with_clock(options: CircuitBreakerOptions<T>, clock: Arc<dyn Clock>) -> Self {
        Self::with_clock_and_sink(options, clock, default_event_sink())
    }

    /// Creates a breaker with an injected clock and event sink.
    ///
    /// Transition events (`circuit.opened`, `circuit.closed`,
    /// `circuit.half_opened`, `circuit.isolated`) are emitted through
    /// the given sink.
    #[must_use]
    pub fn with_clock_and_sink(
        options: CircuitBreakerOptions<T>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let health = match options.trip {
            TripSpec::ConsecutiveFailures(failures) => HealthTracker::consecutive(failures),
            TripSpec::FailureRatio {
                failure_threshold,
                minimum_throughput,
                sampling_duration,
                buckets,
            } => HealthTracker::sampling(
                failure_threshold,
                minimum_throughput,
                sampling_duration,
                buckets,
                clock.now(),
            ),
        };
        let controller =
            BreakerController::new(health, options.break_duration, clock, options.hooks, sink);
        if let Some(ref manual) = options.manual_control {
            manual.attach(&controller);
        }
        Self {
            controller,
            should_handle: options.should_handle,
            manual: options.manual_control,
        }
    }

    /// Returns a read-only view of the circuit state.
    #[must_use]
    pub fn state_view(&self) -> StateView {
        StateView::new(self.controller.clone())
    }

    /// Returns the shared controller.
    #[must_use]
    pub fn controller(&self) -> &Arc<BreakerController> {
        &self.controller
    }
}

#[async_trait]
impl<T> Strategy<T> for CircuitBreakerStrategy<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    async fn execute(&self, ctx: Arc<ExecutionContext>, next: Next<T>) -> Outcome<T> {
        if let Some(ref manual) = self.manual {
            if manual.is_disposed() {
                return Outcome::Exception(FaultError::Disposed);
            }
        }

        match self.controller.admit() {
            Err(fault) => {
                ctx.try_emit_event(
                    "circuit.rejected",
                    Some(serde_json::json!({ "fault": fault.to_string() })),
                );
                Outcome::Exception(fault)
            }
            Ok(admission) => {
                let outcome = next.run(ctx).await;
                let handled = (self.should_handle)(&outcome);
                self.controller.record(admission, handled, outcome.describe());
                outcome
            }
        }
    }
}
