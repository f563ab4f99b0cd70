//! Predicates that classify outcomes as handled faults.
//!
//! A strategy acts only on outcomes its predicate declares handled.
//! Cancellations are never handled by the default predicate: retrying
//! or substituting a canceled call would swallow the caller's intent.

use crate::errors::FaultError;
use crate::outcome::Outcome;
use std::sync::Arc;

/// Decides whether an outcome should be treated as a handled fault.
pub type Predicate<T> = Arc<dyn Fn(&Outcome<T>) -> bool + Send + Sync>;

/// The default predicate: handles every fault except cancellation.
#[must_use]
pub fn handle_exceptions<T>() -> Predicate<T> {
    Arc::new(|outcome| match outcome {
        Outcome::Result(_) => false,
        Outcome::Exception(fault) => !fault.is_canceled(),
    })
}

/// Builds a predicate from an arbitrary classification function.
pub fn handle_when<T, F>(f: F) -> Predicate<T>
where
    F: Fn(&Outcome<T>) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handles faults matching the given classifier, plus nothing else.
pub fn handle_exception_when<T, F>(f: F) -> Predicate<T>
where
    F: Fn(&FaultError) -> bool + Send + Sync + 'static,
{
    Arc::new(move |outcome| match outcome {
        Outcome::Result(_) => false,
        Outcome::Exception(fault) => f(fault),
    })
}

/// Handles result values matching the given classifier, plus all
/// non-canceled faults.
pub fn handle_result_when<T, F>(f: F) -> Predicate<T>
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    Arc::new(move |outcome| match outcome {
        Outcome::Result(value) => f(value),
        Outcome::Exception(fault) => !fault.is_canceled(),
    })
}
