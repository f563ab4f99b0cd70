//! Mock operations for exercising strategies.

use crate::context::ExecutionContext;
use crate::errors::FaultError;
use crate::outcome::Outcome;
use crate::strategies::Operation;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A stand-in for transient remote failures.
#[derive(Debug, Clone, Error)]
#[error("transient failure: {message}")]
pub struct TransientError {
    /// Failure description.
    pub message: String,
}

impl TransientError {
    /// Creates a new transient error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An operation that plays back a script of outcomes and records calls.
///
/// When the script runs dry, the configured fallback outcome repeats.
pub struct ScriptedOperation<T> {
    script: Mutex<VecDeque<Outcome<T>>>,
    fallback: Outcome<T>,
    calls: AtomicUsize,
}

impl<T> ScriptedOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an operation from an explicit script and fallback.
    #[must_use]
    pub fn new(script: Vec<Outcome<T>>, fallback: Outcome<T>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    /// Fails `failures` times with a transient error, then succeeds
    /// with `value` forever.
    #[must_use]
    pub fn fail_times(failures: usize, value: T) -> Arc<Self> {
        let script = (0..failures)
            .map(|i| {
                Outcome::Exception(FaultError::execution(TransientError::new(format!(
                    "scripted failure {i}"
                ))))
            })
            .collect();
        Self::new(script, Outcome::Result(value))
    }

    /// Fails on every call.
    #[must_use]
    pub fn always_failing() -> Arc<Self> {
        Self::new(
            Vec::new(),
            Outcome::Exception(FaultError::execution(TransientError::new("always fails"))),
        )
    }

    /// Succeeds with `value` on every call.
    #[must_use]
    pub fn succeeding(value: T) -> Arc<Self> {
        Self::new(Vec::new(), Outcome::Result(value))
    }

    /// Returns how many times the operation ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wraps this script as a callback for the pipeline execute
    /// surface.
    pub fn callback(
        self: &Arc<Self>,
    ) -> impl Fn(
        Arc<ExecutionContext>,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<T, FaultError>> + Send>,
    > + Send
           + Sync
           + 'static {
        let this = self.clone();
        move |_ctx| {
            let this = this.clone();
            Box::pin(async move {
                this.calls.fetch_add(1, Ordering::SeqCst);
                let scripted = this.script.lock().pop_front();
                scripted
                    .unwrap_or_else(|| this.fallback.clone())
                    .into_result()
            })
        }
    }

    /// Wraps this script as a pipeline operation.
    #[must_use]
    pub fn operation(self: &Arc<Self>) -> Operation<T> {
        let this = self.clone();
        Arc::new(move |_ctx: Arc<ExecutionContext>| {
            let this = this.clone();
            Box::pin(async move {
                this.calls.fetch_add(1, Ordering::SeqCst);
                let scripted = this.script.lock().pop_front();
                scripted.unwrap_or_else(|| this.fallback.clone())
            })
        })
    }
}

/// An operation that sleeps before succeeding, observing cancellation.
///
/// Returns a canceled outcome if the context is cancelled mid-sleep.
pub fn sleepy_operation<T>(delay: Duration, value: T) -> Operation<T>
where
    T: Clone + Send + Sync + 'static,
{
    Arc::new(move |ctx: Arc<ExecutionContext>| {
        let value = value.clone();
        Box::pin(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => Outcome::Result(value),
                () = ctx.cancellation().cancelled() => {
                    Outcome::Exception(FaultError::canceled(ctx.cancellation().reason()))
                }
            }
        })
    })
}
