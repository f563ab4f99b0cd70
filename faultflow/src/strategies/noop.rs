//! Identity strategy.

use super::{Next, Strategy};
use crate::context::ExecutionContext;
use crate::outcome::Outcome;
use async_trait::async_trait;
use std::sync::Arc;

/// Passes every call straight through. Backs empty pipelines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStrategy;

impl NoOpStrategy {
    /// Creates a new no-op strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<T> Strategy<T> for NoOpStrategy
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn execute(&self, ctx: Arc<ExecutionContext>, next: Next<T>) -> Outcome<T> {
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{context_from, ContextOptions};
    use crate::strategies::operation_from;

    #[tokio::test]
    async fn test_noop_passes_through() {
        let strategy = NoOpStrategy::new();
        let op = operation_from(|_| async { Ok("value") });
        let next = Next::new(Arc::from(Vec::new().into_boxed_slice()), op);
        let ctx = context_from(ContextOptions::new());

        let outcome = strategy.execute(ctx, next).await;
        assert_eq!(outcome.result(), Some(&"value"));
    }
}
