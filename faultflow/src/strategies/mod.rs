//! Fault-handling strategies and the abstraction they share.
//!
//! A strategy wraps a continuation ([`Next`]) and must do exactly one
//! of three things: return without invoking it (short-circuit), invoke
//! it once and return the outcome or a transform of it, or invoke it
//! several times and return a chosen outcome (retry, hedging).

pub mod bulkhead;
pub mod cache;
pub mod circuit_breaker;
pub mod fallback;
pub mod hedging;
pub mod noop;
pub mod rate_limit;
pub mod retry;
pub mod timeout;

use crate::context::ExecutionContext;
use crate::errors::FaultError;
use crate::outcome::Outcome;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The user-supplied operation a pipeline executes.
pub type Operation<T> = Arc<
    dyn Fn(Arc<ExecutionContext>) -> Pin<Box<dyn Future<Output = Outcome<T>> + Send>>
        + Send
        + Sync,
>;

/// A fault-handling strategy in a pipeline.
///
/// Implementations constrain `T` to `Clone + Send + Sync + 'static`,
/// the bound every pipeline value type satisfies.
#[async_trait]
pub trait Strategy<T>: Send + Sync {
    /// A short name for events and diagnostics.
    fn name(&self) -> &'static str;

    /// Executes the strategy around the continuation.
    async fn execute(&self, ctx: Arc<ExecutionContext>, next: Next<T>) -> Outcome<T>;
}

/// The continuation a strategy invokes: the remaining strategies in the
/// chain followed by the user operation.
///
/// Cheap to clone and `'static`, so strategies may invoke it repeatedly
/// or spawn it onto tasks.
pub struct Next<T> {
    chain: Arc<[Arc<dyn Strategy<T>>]>,
    index: usize,
    operation: Operation<T>,
}

impl<T> Clone for Next<T> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            index: self.index,
            operation: self.operation.clone(),
        }
    }
}

impl<T> Next<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(chain: Arc<[Arc<dyn Strategy<T>>]>, operation: Operation<T>) -> Self {
        Self {
            chain,
            index: 0,
            operation,
        }
    }

    /// Runs the continuation: the next strategy, or the user operation
    /// when the chain is exhausted.
    ///
    /// Cancellation observed before the user operation runs produces a
    /// canceled outcome without invoking it.
    pub async fn run(&self, ctx: Arc<ExecutionContext>) -> Outcome<T> {
        match self.chain.get(self.index) {
            Some(strategy) => {
                let next = Self {
                    chain: self.chain.clone(),
                    index: self.index + 1,
                    operation: self.operation.clone(),
                };
                strategy.execute(ctx, next).await
            }
            None => {
                if ctx.cancellation().is_cancelled() {
                    return Outcome::Exception(FaultError::canceled(ctx.cancellation().reason()));
                }
                (self.operation)(ctx).await
            }
        }
    }
}

impl<T> std::fmt::Debug for Next<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &(self.chain.len().saturating_sub(self.index)))
            .finish()
    }
}

/// Wraps a plain async closure into an [`Operation`].
pub fn operation_from<T, F, Fut>(f: F) -> Operation<T>
where
    T: Send + 'static,
    F: Fn(Arc<ExecutionContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FaultError>> + Send + 'static,
{
    Arc::new(move |ctx| {
        let fut = f(ctx);
        Box::pin(async move { fut.await.into() })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{context_from, ContextOptions};

    #[tokio::test]
    async fn test_empty_chain_invokes_operation() {
        let op = operation_from(|_ctx| async { Ok(7) });
        let next = Next::new(Arc::from(Vec::new().into_boxed_slice()), op);
        let ctx = context_from(ContextOptions::new());

        let outcome = next.run(ctx).await;
        assert_eq!(outcome.result(), Some(&7));
    }

    #[tokio::test]
    async fn test_pre_cancelled_context_skips_operation() {
        let op: Operation<i32> = operation_from(|_ctx| async { panic!("operation must not run") });
        let next = Next::new(Arc::from(Vec::new().into_boxed_slice()), op);
        let ctx = context_from(ContextOptions::new());
        ctx.cancellation().cancel("caller gone");

        let outcome = next.run(ctx).await;
        match outcome.exception() {
            Some(FaultError::OperationCanceled { reason }) => {
                assert_eq!(reason, "caller gone");
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
    }
}
