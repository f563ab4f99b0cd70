//! Error types for the faultflow library.
//!
//! The taxonomy distinguishes rejections produced by strategies
//! (circuit open, timeout, bulkhead full) from failures of the wrapped
//! operation itself, which pass through unchanged.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The fault type carried through pipelines and returned to callers.
///
/// Cloneable so that circuit breakers can retain the last handled
/// outcome and hedging can fan a single outcome out to observers.
#[derive(Debug, Clone, Error)]
pub enum FaultError {
    /// The circuit is open and the call was rejected without execution.
    #[error("circuit breaker is open; retry permitted in {retry_after:?}")]
    BrokenCircuit {
        /// Time remaining until the next probe is admitted.
        retry_after: Duration,
        /// Description of the outcome that tripped the circuit.
        last_outcome: String,
    },

    /// The circuit was manually isolated and rejects all calls.
    #[error("circuit breaker is isolated by manual control")]
    IsolatedCircuit,

    /// A manual control handle attached to this strategy was disposed.
    #[error("circuit breaker manual control has been disposed")]
    Disposed,

    /// The deadline elapsed before the operation completed.
    #[error("operation timed out after {elapsed:?}")]
    TimeoutRejected {
        /// Time spent waiting before the deadline fired.
        elapsed: Duration,
    },

    /// All bulkhead permits are held and the queue is full.
    #[error("bulkhead has no free capacity and the queue is full")]
    BulkheadRejected,

    /// The rate limiter's token bucket is exhausted.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Cancellation was observed before or during execution.
    #[error("operation canceled: {reason}")]
    OperationCanceled {
        /// The reason recorded on the cancellation token.
        reason: String,
    },

    /// A cache provider failed. Isolated by the cache strategy and
    /// never surfaced as the result of a call.
    #[error("{0}")]
    Cache(#[from] CacheError),

    /// A failure raised by the wrapped operation, passed through
    /// unchanged when no strategy handles it.
    #[error("{0}")]
    Execution(Arc<dyn std::error::Error + Send + Sync>),
}

impl FaultError {
    /// Wraps an arbitrary error from the user operation.
    pub fn execution<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Execution(Arc::new(error))
    }

    /// Creates a canceled fault from an optional token reason.
    #[must_use]
    pub fn canceled(reason: Option<String>) -> Self {
        Self::OperationCanceled {
            reason: reason.unwrap_or_else(|| "canceled".to_string()),
        }
    }

    /// Classifies this fault for capture reports.
    #[must_use]
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::BrokenCircuit { .. } => FaultKind::BrokenCircuit,
            Self::IsolatedCircuit => FaultKind::IsolatedCircuit,
            Self::Disposed => FaultKind::Disposed,
            Self::TimeoutRejected { .. } => FaultKind::Timeout,
            Self::BulkheadRejected => FaultKind::Bulkhead,
            Self::RateLimited => FaultKind::RateLimited,
            Self::OperationCanceled { .. } => FaultKind::Canceled,
            Self::Cache(_) => FaultKind::Cache,
            Self::Execution(_) => FaultKind::Execution,
        }
    }

    /// Returns true if this fault is a cancellation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::OperationCanceled { .. })
    }
}

impl PartialEq for FaultError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::BrokenCircuit {
                    retry_after: a_retry,
                    last_outcome: a_outcome,
                },
                Self::BrokenCircuit {
                    retry_after: b_retry,
                    last_outcome: b_outcome,
                },
            ) => a_retry == b_retry && a_outcome == b_outcome,
            (Self::IsolatedCircuit, Self::IsolatedCircuit) => true,
            (Self::Disposed, Self::Disposed) => true,
            (
                Self::TimeoutRejected { elapsed: a },
                Self::TimeoutRejected { elapsed: b },
            ) => a == b,
            (Self::BulkheadRejected, Self::BulkheadRejected) => true,
            (Self::RateLimited, Self::RateLimited) => true,
            (
                Self::OperationCanceled { reason: a },
                Self::OperationCanceled { reason: b },
            ) => a == b,
            (Self::Cache(a), Self::Cache(b)) => a == b,
            (Self::Execution(a), Self::Execution(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

/// Coarse classification of a fault, used by capture reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Rejected by an open circuit.
    BrokenCircuit,
    /// Rejected by an isolated circuit.
    IsolatedCircuit,
    /// Rejected because a manual control was disposed.
    Disposed,
    /// Rejected by a timeout strategy.
    Timeout,
    /// Rejected by a bulkhead.
    Bulkhead,
    /// Rejected by a rate limiter.
    RateLimited,
    /// Canceled by the caller or a linked token.
    Canceled,
    /// A cache provider failure.
    Cache,
    /// A failure of the wrapped operation.
    Execution,
}

/// Error raised by cache providers.
///
/// The cache strategy isolates these: a failing provider routes to the
/// error hooks and the call proceeds against the wrapped operation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cache provider error: {message}")]
pub struct CacheError {
    /// Human-readable description of the provider failure.
    pub message: String,
}

impl CacheError {
    /// Creates a new cache error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised when strategy options fail validation at build time.
///
/// Collects every violated constraint so the caller sees the full set
/// in one failure.
#[derive(Debug, Clone, Error)]
#[error("invalid pipeline configuration: {}", .violations.join("; "))]
pub struct ConfigError {
    /// The violated constraints.
    pub violations: Vec<String>,
}

impl ConfigError {
    /// Creates a config error from a set of violations.
    #[must_use]
    pub fn new(violations: Vec<String>) -> Self {
        Self { violations }
    }
}
