//! The composed pipeline and its execution surfaces.

use super::ExecutionReport;
use crate::context::{ContextOptions, ExecutionContext};
use crate::errors::FaultError;
use crate::events::EventSink;
use crate::outcome::Outcome;
use crate::strategies::{operation_from, Next, Strategy};
use std::future::Future;
use std::sync::Arc;

/// An immutable, reusable composition of strategies.
///
/// Built once by [`PipelineBuilder`](super::PipelineBuilder) and safe
/// for any number of concurrent executions; nothing per-execution is
/// stored on the pipeline itself.
pub struct Pipeline<T> {
    chain: Arc<[Arc<dyn Strategy<T>>]>,
    event_sink: Arc<dyn EventSink>,
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            event_sink: self.event_sink.clone(),
        }
    }
}

impl<T> Pipeline<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        chain: Arc<[Arc<dyn Strategy<T>>]>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self { chain, event_sink }
    }

    /// Returns the number of composed strategies.
    #[must_use]
    pub fn strategy_count(&self) -> usize {
        self.chain.len()
    }

    /// Executes the operation, re-raising the fault on failure.
    pub async fn execute<F, Fut>(&self, operation: F) -> Result<T, FaultError>
    where
        F: Fn(Arc<ExecutionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FaultError>> + Send + 'static,
    {
        self.execute_with(ContextOptions::new(), operation).await
    }

    /// Executes the operation with caller-supplied context options.
    pub async fn execute_with<F, Fut>(
        &self,
        options: ContextOptions,
        operation: F,
    ) -> Result<T, FaultError>
    where
        F: Fn(Arc<ExecutionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FaultError>> + Send + 'static,
    {
        self.execute_outcome_with(options, operation)
            .await
            .into_result()
    }

    /// Executes the operation and returns the raw outcome without
    /// re-raising.
    pub async fn execute_outcome<F, Fut>(&self, operation: F) -> Outcome<T>
    where
        F: Fn(Arc<ExecutionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FaultError>> + Send + 'static,
    {
        self.execute_outcome_with(ContextOptions::new(), operation)
            .await
    }

    /// Outcome-returning variant of [`execute_with`](Self::execute_with).
    pub async fn execute_outcome_with<F, Fut>(
        &self,
        options: ContextOptions,
        operation: F,
    ) -> Outcome<T>
    where
        F: Fn(Arc<ExecutionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FaultError>> + Send + 'static,
    {
        let ctx = Arc::new(ExecutionContext::from_options(
            options,
            self.event_sink.clone(),
        ));
        let next = Next::new(self.chain.clone(), operation_from(operation));
        next.run(ctx).await
    }

    /// Executes the operation and captures the outcome in a structured
    /// report instead of re-raising.
    pub async fn execute_and_capture<F, Fut>(&self, operation: F) -> ExecutionReport<T>
    where
        F: Fn(Arc<ExecutionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FaultError>> + Send + 'static,
    {
        self.execute_and_capture_with(ContextOptions::new(), operation)
            .await
    }

    /// Capture variant of [`execute_with`](Self::execute_with).
    pub async fn execute_and_capture_with<F, Fut>(
        &self,
        options: ContextOptions,
        operation: F,
    ) -> ExecutionReport<T>
    where
        F: Fn(Arc<ExecutionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FaultError>> + Send + 'static,
    {
        ExecutionReport::new(self.execute_outcome_with(options, operation).await)
    }

    /// Blocking surface for synchronous callers.
    ///
    /// Marks the context synchronous and blocks on the same async
    /// algorithm. Inside a multi-threaded runtime the calling worker is
    /// parked via `block_in_place`; outside any runtime a private
    /// current-thread runtime drives the call. Must not be called from
    /// a current-thread runtime.
    pub fn execute_sync<F, Fut>(
        &self,
        options: ContextOptions,
        operation: F,
    ) -> Result<T, FaultError>
    where
        F: Fn(Arc<ExecutionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FaultError>> + Send + 'static,
    {
        let options = options.mark_synchronous();
        let fut = self.execute_with(options, operation);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => tokio::task::block_in_place(|| handle.block_on(fut)),
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(FaultError::execution)?;
                runtime.block_on(fut)
            }
        }
    }
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("strategies", &self.chain.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::PipelineBuilder;
    use super::*;
    use crate::errors::FaultKind;
    use crate::testing::TransientError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_execute_returns_value() {
        let pipeline: Pipeline<i32> = PipelineBuilder::new().build().unwrap();
        let result = pipeline.execute(|_| async { Ok(11) }).await;
        assert_eq!(result.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_execute_reraises_fault() {
        let pipeline: Pipeline<i32> = PipelineBuilder::new().build().unwrap();
        let result = pipeline
            .execute(|_| async { Err(FaultError::execution(TransientError::new("boom"))) })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_void_operations_supported() {
        let pipeline: Pipeline<()> = PipelineBuilder::new().build().unwrap();
        let result = pipeline.execute(|_| async { Ok(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_execute_and_capture_classifies() {
        let pipeline: Pipeline<i32> = PipelineBuilder::new().build().unwrap();
        let report = pipeline
            .execute_and_capture(|_| async { Err(FaultError::BulkheadRejected) })
            .await;
        assert!(!report.is_success());
        assert_eq!(report.fault_kind(), Some(FaultKind::Bulkhead));

        let report = pipeline.execute_and_capture(|_| async { Ok(3) }).await;
        assert!(report.is_success());
        assert_eq!(report.final_result(), Some(&3));
    }

    #[tokio::test]
    async fn test_concurrent_reuse() {
        let pipeline: Pipeline<usize> = PipelineBuilder::new().build().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pipeline = pipeline.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                pipeline
                    .execute(move |_| {
                        let counter = counter.clone();
                        async move { Ok(counter.fetch_add(1, Ordering::SeqCst)) }
                    })
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_execute_sync_inside_runtime() {
        let pipeline: Pipeline<i32> = PipelineBuilder::new().build().unwrap();
        let result = pipeline.execute_sync(ContextOptions::new(), |ctx| {
            let synchronous = ctx.is_synchronous();
            async move {
                assert!(synchronous);
                Ok(21)
            }
        });
        assert_eq!(result.unwrap(), 21);
    }

    #[test]
    fn test_execute_sync_outside_runtime() {
        let pipeline: Pipeline<i32> = PipelineBuilder::new().build().unwrap();
        let result = pipeline.execute_sync(ContextOptions::new(), |_| async { Ok(5) });
        assert_eq!(result.unwrap(), 5);
    }
}
