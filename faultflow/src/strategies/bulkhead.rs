//! Bulkhead: bounded concurrency with a bounded wait queue.

use super::{Next, Strategy};
use crate::context::ExecutionContext;
use crate::errors::FaultError;
use crate::outcome::Outcome;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Configuration for the bulkhead strategy.
#[derive(Debug, Clone)]
pub struct BulkheadOptions {
    /// Maximum calls in flight at once.
    pub max_parallelization: usize,
    /// Maximum callers waiting for a permit. `None` is unbounded,
    /// `Some(0)` rejects as soon as all permits are held.
    pub max_queuing: Option<usize>,
}

impl BulkheadOptions {
    /// Creates options with the given parallelization and no queue.
    #[must_use]
    pub fn new(max_parallelization: usize) -> Self {
        Self {
            max_parallelization,
            max_queuing: Some(0),
        }
    }

    /// Sets the queue bound.
    #[must_use]
    pub fn with_max_queuing(mut self, max_queuing: usize) -> Self {
        self.max_queuing = Some(max_queuing);
        self
    }

    /// Removes the queue bound.
    #[must_use]
    pub fn with_unbounded_queue(mut self) -> Self {
        self.max_queuing = None;
        self
    }

    pub(crate) fn validate(&self, violations: &mut Vec<String>) {
        if self.max_parallelization < 1 {
            violations.push(format!(
                "bulkhead: max_parallelization ({}) must be at least 1",
                self.max_parallelization
            ));
        }
    }
}

/// Bounds concurrent executions and queued waiters.
///
/// Permits are released on every path by the RAII permit guard, so a
/// release cannot run twice for one acquisition.
pub struct BulkheadStrategy {
    semaphore: Arc<Semaphore>,
    waiters: Arc<AtomicUsize>,
    max_queuing: Option<usize>,
}

struct WaiterGuard {
    waiters: Arc<AtomicUsize>,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BulkheadStrategy {
    /// Creates a bulkhead.
    #[must_use]
    pub fn new(options: BulkheadOptions) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(options.max_parallelization.max(1))),
            waiters: Arc::new(AtomicUsize::new(0)),
            max_queuing: options.max_queuing,
        }
    }

    /// Returns the number of free permits.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns the number of callers currently queued.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    fn try_enqueue(&self) -> Option<WaiterGuard> {
        match self.max_queuing {
            None => {
                self.waiters.fetch_add(1, Ordering::SeqCst);
                Some(WaiterGuard {
                    waiters: self.waiters.clone(),
                })
            }
            Some(max) => {
                let mut current = self.waiters.load(Ordering::SeqCst);
                loop {
                    if current >= max {
                        return None;
                    }
                    match self.waiters.compare_exchange(
                        current,
                        current + 1,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    ) {
                        Ok(_) => {
                            return Some(WaiterGuard {
                                waiters: self.waiters.clone(),
                            })
                        }
                        Err(actual) => current = actual,
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<T> Strategy<T> for BulkheadStrategy
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "bulkhead"
    }

    async fn execute(&self, ctx: Arc<ExecutionContext>, next: Next<T>) -> Outcome<T> {
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let Some(_waiter) = self.try_enqueue() else {
                    ctx.try_emit_event("bulkhead.rejected", None);
                    tracing::debug!("bulkhead rejected call: permits and queue exhausted");
                    return Outcome::Exception(FaultError::BulkheadRejected);
                };
                tokio::select! {
                    acquired = self.semaphore.clone().acquire_owned() => {
                        match acquired {
                            Ok(permit) => permit,
                            Err(_) => return Outcome::Exception(FaultError::BulkheadRejected),
                        }
                    }
                    () = ctx.cancellation().cancelled() => {
                        return Outcome::Exception(FaultError::canceled(
                            ctx.cancellation().reason(),
                        ));
                    }
                }
            }
        };

        let outcome = next.run(ctx).await;
        drop(permit);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{context_from, ContextOptions};
    use crate::strategies::Operation;
    use crate::testing::{sleepy_operation, ScriptedOperation};
    use std::time::{Duration, Instant};

    fn run_next<T: Clone + Send + Sync + 'static>(op: Operation<T>) -> Next<T> {
        Next::new(Arc::from(Vec::new().into_boxed_slice()), op)
    }

    #[tokio::test]
    async fn test_rejects_when_full_and_queue_zero() {
        let strategy = Arc::new(BulkheadStrategy::new(BulkheadOptions::new(1)));
        let ctx = context_from(ContextOptions::new());

        let slow = sleepy_operation(Duration::from_millis(200), 1);
        let in_flight = {
            let strategy = strategy.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { strategy.execute(ctx, run_next(slow)).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let fast = ScriptedOperation::succeeding(2);
        let start = Instant::now();
        let outcome = strategy.execute(ctx, run_next(fast.operation())).await;
        let elapsed = start.elapsed();

        assert!(matches!(
            outcome.exception(),
            Some(FaultError::BulkheadRejected)
        ));
        assert!(elapsed < Duration::from_millis(100), "rejection must be immediate");
        assert_eq!(fast.call_count(), 0);

        assert_eq!(in_flight.await.unwrap().result(), Some(&1));
    }

    #[tokio::test]
    async fn test_queued_caller_proceeds_after_release() {
        let strategy = Arc::new(BulkheadStrategy::new(
            BulkheadOptions::new(1).with_max_queuing(1),
        ));
        let ctx = context_from(ContextOptions::new());

        let slow = sleepy_operation(Duration::from_millis(80), 1);
        let first = {
            let strategy = strategy.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { strategy.execute(ctx, run_next(slow)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let queued = ScriptedOperation::succeeding(2);
        let outcome = strategy.execute(ctx, run_next(queued.operation())).await;
        assert_eq!(outcome.result(), Some(&2));
        assert_eq!(queued.call_count(), 1);
        assert_eq!(first.await.unwrap().result(), Some(&1));
    }

    #[tokio::test]
    async fn test_queue_overflow_rejected() {
        let strategy = Arc::new(BulkheadStrategy::new(
            BulkheadOptions::new(1).with_max_queuing(1),
        ));
        let ctx = context_from(ContextOptions::new());

        let hold = sleepy_operation(Duration::from_millis(150), 0);
        let first = {
            let strategy = strategy.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { strategy.execute(ctx, run_next(hold)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter_op = sleepy_operation(Duration::from_millis(1), 1);
        let second = {
            let strategy = strategy.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { strategy.execute(ctx, run_next(waiter_op)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(strategy.queued(), 1);

        // Queue slot taken: a third call is rejected immediately.
        let third = ScriptedOperation::succeeding(3);
        let outcome = strategy.execute(ctx, run_next(third.operation())).await;
        assert!(matches!(
            outcome.exception(),
            Some(FaultError::BulkheadRejected)
        ));

        assert!(first.await.unwrap().is_result());
        assert!(second.await.unwrap().is_result());
        assert_eq!(strategy.queued(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_without_permit() {
        let strategy = Arc::new(BulkheadStrategy::new(
            BulkheadOptions::new(1).with_max_queuing(2),
        ));
        let holder_ctx = context_from(ContextOptions::new());

        let hold = sleepy_operation(Duration::from_millis(120), 0);
        let first = {
            let strategy = strategy.clone();
            let ctx = holder_ctx.clone();
            tokio::spawn(async move { strategy.execute(ctx, run_next(hold)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter_ctx = context_from(ContextOptions::new());
        let token = waiter_ctx.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel("caller gave up");
        });

        let queued = ScriptedOperation::succeeding(1);
        let outcome = strategy
            .execute(waiter_ctx, run_next(queued.operation()))
            .await;
        assert!(matches!(
            outcome.exception(),
            Some(FaultError::OperationCanceled { .. })
        ));
        assert_eq!(queued.call_count(), 0);

        assert!(first.await.unwrap().is_result());
        // The cancelled waiter consumed no permit.
        assert_eq!(strategy.available_permits(), 1);
        assert_eq!(strategy.queued(), 0);
    }

    #[test]
    fn test_validation() {
        let mut violations = Vec::new();
        BulkheadOptions::new(0).validate(&mut violations);
        assert_eq!(violations.len(), 1);
    }
}
