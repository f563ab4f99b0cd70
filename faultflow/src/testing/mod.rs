//! Test doubles: scripted operations and helper errors.

mod mocks;

pub use mocks::{sleepy_operation, ScriptedOperation, TransientError};
