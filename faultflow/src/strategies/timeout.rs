//! Timeout strategy with optimistic and pessimistic enforcement.

use super::{Next, Strategy};
use crate::context::ExecutionContext;
use crate::errors::FaultError;
use crate::outcome::Outcome;
use crate::time::{Clock, SystemClock};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// How the deadline is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutMode {
    /// Cancel a linked child token and trust the callback to observe
    /// it. The callback's work stops only if it cooperates.
    #[default]
    Optimistic,
    /// Run the continuation on its own task and abandon waiting at the
    /// deadline. The underlying work continues; its outcome is
    /// discarded.
    Pessimistic,
}

/// Computes a per-call timeout from the context.
pub type TimeoutGenerator = Arc<dyn Fn(&ExecutionContext) -> Option<Duration> + Send + Sync>;

/// Hook invoked when a deadline fires.
pub type TimeoutHook = Arc<dyn Fn(Duration) + Send + Sync>;

/// Configuration for the timeout strategy.
#[derive(Clone, Default)]
pub struct TimeoutOptions {
    /// The deadline. `None` means infinite and disables the strategy.
    pub timeout: Option<Duration>,
    /// Optional per-call override computed from the context.
    pub generator: Option<TimeoutGenerator>,
    /// Enforcement mode.
    pub mode: TimeoutMode,
    /// Invoked with the elapsed time when the deadline fires.
    pub on_timeout: Option<TimeoutHook>,
}

impl TimeoutOptions {
    /// Creates options with a fixed deadline.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            generator: None,
            mode: TimeoutMode::Optimistic,
            on_timeout: None,
        }
    }

    /// Creates options with no deadline (a disabled strategy).
    #[must_use]
    pub fn infinite() -> Self {
        Self::default()
    }

    /// Sets the enforcement mode.
    #[must_use]
    pub fn with_mode(mut self, mode: TimeoutMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets a per-call timeout generator.
    #[must_use]
    pub fn with_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Option<Duration> + Send + Sync + 'static,
    {
        self.generator = Some(Arc::new(generator));
        self
    }

    /// Sets the timeout hook.
    #[must_use]
    pub fn with_on_timeout<F>(mut self, hook: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(hook));
        self
    }

    pub(crate) fn validate(&self, violations: &mut Vec<String>) {
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                violations.push("timeout: duration must be positive".to_string());
            }
        }
    }
}

/// Enforces a deadline on the continuation.
pub struct TimeoutStrategy {
    options: TimeoutOptions,
    clock: Arc<dyn Clock>,
}

impl TimeoutStrategy {
    /// Creates a timeout strategy with the production clock.
    #[must_use]
    pub fn new(options: TimeoutOptions) -> Self {
        Self {
            options,
            clock: Arc::new(SystemClock),
        }
    }

    /// Substitutes the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn deadline_for(&self, ctx: &ExecutionContext) -> Option<Duration> {
        if let Some(ref generator) = self.options.generator {
            if let Some(duration) = generator(ctx) {
                return Some(duration);
            }
        }
        self.options.timeout
    }

    fn rejected(&self, ctx: &ExecutionContext, elapsed: Duration) -> FaultError {
        if let Some(ref hook) = self.options.on_timeout {
            hook(elapsed);
        }
        ctx.try_emit_event(
            "timeout.rejected",
            Some(serde_json::json!({ "elapsed_ms": elapsed.as_millis() as u64 })),
        );
        tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "operation timed out");
        FaultError::TimeoutRejected { elapsed }
    }
}

#[async_trait]
impl<T> Strategy<T> for TimeoutStrategy
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "timeout"
    }

    async fn execute(&self, ctx: Arc<ExecutionContext>, next: Next<T>) -> Outcome<T> {
        let Some(deadline) = self.deadline_for(&ctx) else {
            return next.run(ctx).await;
        };

        let child = ctx.fork();
        let start = self.clock.now();

        match self.options.mode {
            TimeoutMode::Optimistic => {
                tokio::select! {
                    outcome = next.run(child.clone()) => outcome,
                    () = self.clock.sleep(deadline) => {
                        child.cancellation().cancel("timeout");
                        let elapsed = self.clock.now().saturating_duration_since(start);
                        Outcome::Exception(self.rejected(&ctx, elapsed))
                    }
                }
            }
            TimeoutMode::Pessimistic => {
                let task_next = next.clone();
                let task_child = child.clone();
                let mut handle =
                    tokio::spawn(async move { task_next.run(task_child).await });

                tokio::select! {
                    joined = &mut handle => match joined {
                        Ok(outcome) => outcome,
                        Err(join_error) => Outcome::Exception(FaultError::execution(join_error)),
                    },
                    () = self.clock.sleep(deadline) => {
                        // Abandon the task; cooperative work may still
                        // stop via the child token.
                        child.cancellation().cancel("timeout");
                        let elapsed = self.clock.now().saturating_duration_since(start);
                        Outcome::Exception(self.rejected(&ctx, elapsed))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{context_from, ContextOptions};
    use crate::strategies::{operation_from, Operation};
    use crate::testing::{sleepy_operation, ScriptedOperation};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn run_next<T: Clone + Send + Sync + 'static>(op: Operation<T>) -> Next<T> {
        Next::new(Arc::from(Vec::new().into_boxed_slice()), op)
    }

    #[tokio::test]
    async fn test_completes_before_deadline() {
        let strategy = TimeoutStrategy::new(TimeoutOptions::new(Duration::from_secs(5)));
        let op = ScriptedOperation::succeeding(3);
        let ctx = context_from(ContextOptions::new());

        let outcome = strategy.execute(ctx, run_next(op.operation())).await;
        assert_eq!(outcome.result(), Some(&3));
    }

    #[tokio::test]
    async fn test_optimistic_cancels_cooperative_callback() {
        let strategy = TimeoutStrategy::new(TimeoutOptions::new(Duration::from_millis(40)));
        let op = sleepy_operation(Duration::from_secs(10), 1);
        let ctx = context_from(ContextOptions::new());

        let start = Instant::now();
        let outcome = strategy.execute(ctx, run_next(op)).await;
        let elapsed = start.elapsed();

        match outcome.exception() {
            Some(FaultError::TimeoutRejected { elapsed: reported }) => {
                assert!(*reported >= Duration::from_millis(40));
            }
            other => panic!("expected TimeoutRejected, got {other:?}"),
        }
        assert!(elapsed < Duration::from_secs(2), "elapsed: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_pessimistic_abandons_uncooperative_callback() {
        let strategy = TimeoutStrategy::new(
            TimeoutOptions::new(Duration::from_millis(50)).with_mode(TimeoutMode::Pessimistic),
        );
        // Plain sleep: never observes cancellation.
        let op = operation_from(|_ctx| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        });
        let ctx = context_from(ContextOptions::new());

        let start = Instant::now();
        let outcome = strategy.execute(ctx, run_next(op)).await;
        let elapsed = start.elapsed();

        assert!(matches!(
            outcome.exception(),
            Some(FaultError::TimeoutRejected { .. })
        ));
        assert!(elapsed < Duration::from_secs(1), "elapsed: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_infinite_timeout_disables_strategy() {
        let strategy = TimeoutStrategy::new(TimeoutOptions::infinite());
        let op = sleepy_operation(Duration::from_millis(30), 9);
        let ctx = context_from(ContextOptions::new());

        let outcome = strategy.execute(ctx, run_next(op)).await;
        assert_eq!(outcome.result(), Some(&9));
    }

    #[tokio::test]
    async fn test_generator_overrides_fixed_timeout() {
        let strategy = TimeoutStrategy::new(
            TimeoutOptions::new(Duration::from_secs(10))
                .with_generator(|_ctx| Some(Duration::from_millis(30))),
        );
        let op = sleepy_operation(Duration::from_secs(10), 1);
        let ctx = context_from(ContextOptions::new());

        let start = Instant::now();
        let outcome = strategy.execute(ctx, run_next(op)).await;
        assert!(outcome.is_exception());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_on_timeout_hook_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let strategy = TimeoutStrategy::new(
            TimeoutOptions::new(Duration::from_millis(20)).with_on_timeout(move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let op = sleepy_operation(Duration::from_secs(5), 1);
        let ctx = context_from(ContextOptions::new());

        let _ = strategy.execute(ctx, run_next(op)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_timeout_invalid() {
        let mut violations = Vec::new();
        TimeoutOptions::new(Duration::ZERO).validate(&mut violations);
        assert_eq!(violations.len(), 1);
    }
}
