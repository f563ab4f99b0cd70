//! Cooperative cancellation primitives.
//!
//! A single token is threaded through every strategy in a pipeline.
//! Timeout and hedging fork linked child tokens: canceling a parent
//! cancels its children, canceling a child never propagates upward.

mod token;

pub use token::CancellationToken;
