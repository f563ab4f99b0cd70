//! # Faultflow
//!
//! A composable resilience pipeline for wrapping unreliable operations
//! (typically remote calls) with fault-handling strategies:
//!
//! - **Retry**: jittered backoff with an attempt budget
//! - **Circuit breaker**: consecutive-count and rolling-window flavors,
//!   with half-open probing and manual control
//! - **Timeout**: optimistic (cooperative) or pessimistic enforcement
//! - **Bulkhead**: bounded concurrency with a bounded queue
//! - **Hedging**: parallel speculative attempts, first acceptable
//!   outcome wins
//! - **Cache**: pluggable provider with TTL policies
//! - **Rate limiter**: token bucket admission
//! - **Fallback**: substitute handled outcomes
//!
//! Strategies compose into an immutable [`pipeline::Pipeline`] that is
//! reused across any number of concurrent executions.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use faultflow::prelude::*;
//! use std::time::Duration;
//!
//! let pipeline: Pipeline<String> = PipelineBuilder::new()
//!     .retry(RetryOptions::new().with_max_retries(3))
//!     .circuit_breaker(CircuitBreakerOptions::consecutive(5))
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! let value = pipeline.execute(|_ctx| async { fetch().await }).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod errors;
pub mod events;
pub mod outcome;
pub mod pipeline;
pub mod predicate;
pub mod strategies;
pub mod testing;
pub mod time;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{ContextOptions, ExecutionContext, Properties, PropertyKey};
    pub use crate::errors::{CacheError, ConfigError, FaultError, FaultKind};
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::outcome::Outcome;
    pub use crate::pipeline::{ExecutionReport, Pipeline, PipelineBuilder};
    pub use crate::predicate::{
        handle_exception_when, handle_exceptions, handle_result_when, handle_when, Predicate,
    };
    pub use crate::strategies::bulkhead::BulkheadOptions;
    pub use crate::strategies::cache::{CacheOptions, CacheProvider, MemoryCache, Ttl};
    pub use crate::strategies::circuit_breaker::{
        CircuitBreakerOptions, CircuitState, ManualControl, StateView, TripSpec,
    };
    pub use crate::strategies::fallback::FallbackOptions;
    pub use crate::strategies::hedging::HedgingOptions;
    pub use crate::strategies::rate_limit::RateLimitOptions;
    pub use crate::strategies::retry::{Backoff, RetryOptions};
    pub use crate::strategies::timeout::{TimeoutMode, TimeoutOptions};
    pub use crate::strategies::{Next, Operation, Strategy};
    pub use crate::time::{Clock, SystemClock};
}
