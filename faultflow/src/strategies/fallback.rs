//! Fallback: substitute a handled outcome with an alternative result.

use super::{Next, Strategy};
use crate::context::ExecutionContext;
use crate::outcome::Outcome;
use crate::predicate::{handle_exceptions, Predicate};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Produces the substitute outcome for a handled one.
pub type FallbackAction<T> = Arc<
    dyn Fn(Outcome<T>, Arc<ExecutionContext>) -> Pin<Box<dyn Future<Output = Outcome<T>> + Send>>
        + Send
        + Sync,
>;

/// Hook invoked once per substitution.
pub type FallbackHook = Arc<dyn Fn() + Send + Sync>;

/// Configuration for the fallback strategy.
#[derive(Clone)]
pub struct FallbackOptions<T> {
    /// Decides which outcomes are substituted.
    pub should_handle: Predicate<T>,
    /// Produces the substitute.
    pub action: FallbackAction<T>,
    /// Fired once per substitution.
    pub on_fallback: Option<FallbackHook>,
}

impl<T> FallbackOptions<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates options from an async fallback action.
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn(Outcome<T>, Arc<ExecutionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        Self {
            should_handle: handle_exceptions(),
            action: Arc::new(move |outcome, ctx| Box::pin(action(outcome, ctx))),
            on_fallback: None,
        }
    }

    /// Creates options substituting a constant value.
    #[must_use]
    pub fn constant(value: T) -> Self {
        Self::new(move |_, _| {
            let value = value.clone();
            async move { Outcome::Result(value) }
        })
    }

    /// Sets the handled-outcome predicate.
    #[must_use]
    pub fn with_should_handle(mut self, predicate: Predicate<T>) -> Self {
        self.should_handle = predicate;
        self
    }

    /// Sets the substitution hook.
    #[must_use]
    pub fn with_on_fallback<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_fallback = Some(Arc::new(hook));
        self
    }

    pub(crate) fn validate(&self, _violations: &mut Vec<String>) {
        // An action is required by construction.
    }
}

/// Replaces handled outcomes with the configured substitute.
pub struct FallbackStrategy<T> {
    options: FallbackOptions<T>,
}

impl<T> FallbackStrategy<T> {
    /// Creates a fallback strategy.
    #[must_use]
    pub fn new(options: FallbackOptions<T>) -> Self {
        Self { options }
    }
}

#[async_trait]
impl<T> Strategy<T> for FallbackStrategy<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn execute(&self, ctx: Arc<ExecutionContext>, next: Next<T>) -> Outcome<T> {
        let outcome = next.run(ctx.clone()).await;
        if !(self.options.should_handle)(&outcome) {
            return outcome;
        }

        if let Some(ref hook) = self.options.on_fallback {
            hook();
        }
        ctx.try_emit_event(
            "fallback.applied",
            Some(serde_json::json!({ "outcome": outcome.describe() })),
        );
        tracing::debug!(outcome = %outcome.describe(), "substituting handled outcome");
        (self.options.action)(outcome, ctx).await
    }
}
