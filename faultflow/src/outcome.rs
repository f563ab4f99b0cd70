//! The uniform result carrier threaded through pipelines.

use crate::errors::FaultError;

/// The outcome of executing an operation: either a produced value or a
/// captured fault. Exactly one arm is populated and the value is
/// immutable after construction.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The operation produced a value. The value itself may still be
    /// classified as handled by a predicate (e.g. an HTTP 503 response).
    Result(T),
    /// The operation raised a fault.
    Exception(FaultError),
}

impl<T> Outcome<T> {
    /// Creates a success outcome.
    #[must_use]
    pub fn from_result(value: T) -> Self {
        Self::Result(value)
    }

    /// Creates a fault outcome.
    #[must_use]
    pub fn from_exception(fault: FaultError) -> Self {
        Self::Exception(fault)
    }

    /// Returns true if this outcome carries a value.
    #[must_use]
    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }

    /// Returns true if this outcome carries a fault.
    #[must_use]
    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception(_))
    }

    /// Returns the value, if any.
    #[must_use]
    pub fn result(&self) -> Option<&T> {
        match self {
            Self::Result(value) => Some(value),
            Self::Exception(_) => None,
        }
    }

    /// Returns the fault, if any.
    #[must_use]
    pub fn exception(&self) -> Option<&FaultError> {
        match self {
            Self::Result(_) => None,
            Self::Exception(fault) => Some(fault),
        }
    }

    /// Converts into a standard `Result`, re-raising faults.
    pub fn into_result(self) -> Result<T, FaultError> {
        match self {
            Self::Result(value) => Ok(value),
            Self::Exception(fault) => Err(fault),
        }
    }

    /// Renders a short description for telemetry and circuit records.
    ///
    /// Values are not required to be `Debug`, so the success arm is
    /// described generically.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Result(_) => "result".to_string(),
            Self::Exception(fault) => fault.to_string(),
        }
    }
}

impl<T> From<Result<T, FaultError>> for Outcome<T> {
    fn from(result: Result<T, FaultError>) -> Self {
        match result {
            Ok(value) => Self::Result(value),
            Err(fault) => Self::Exception(fault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_arm() {
        let outcome = Outcome::from_result(42);
        assert!(outcome.is_result());
        assert!(!outcome.is_exception());
        assert_eq!(outcome.result(), Some(&42));
        assert!(outcome.exception().is_none());
        assert_eq!(outcome.into_result(), Ok(42));
    }

    #[test]
    fn test_exception_arm() {
        let outcome: Outcome<i32> = Outcome::from_exception(FaultError::BulkheadRejected);
        assert!(outcome.is_exception());
        assert!(outcome.result().is_none());
        assert!(outcome.into_result().is_err());
    }

    #[test]
    fn test_describe() {
        let ok = Outcome::from_result(1);
        assert_eq!(ok.describe(), "result");

        let err: Outcome<i32> = Outcome::from_exception(FaultError::RateLimited);
        assert!(err.describe().contains("rate limit"));
    }

    #[test]
    fn test_from_std_result() {
        let outcome: Outcome<i32> = Ok(7).into();
        assert_eq!(outcome.result(), Some(&7));

        let outcome: Outcome<i32> = Err(FaultError::BulkheadRejected).into();
        assert!(outcome.is_exception());
    }
}
