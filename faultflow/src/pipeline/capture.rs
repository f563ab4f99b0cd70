//! Structured capture of an execution's final outcome.

use crate::errors::{FaultError, FaultKind};
use crate::outcome::Outcome;

/// The result of `execute_and_capture`: the final outcome plus a
/// classification of how the call ended, without re-raising.
#[derive(Debug, Clone)]
pub struct ExecutionReport<T> {
    outcome: Outcome<T>,
}

impl<T> ExecutionReport<T> {
    pub(crate) fn new(outcome: Outcome<T>) -> Self {
        Self { outcome }
    }

    /// Returns true when the call produced a value.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_result()
    }

    /// Returns the final value, if any.
    #[must_use]
    pub fn final_result(&self) -> Option<&T> {
        self.outcome.result()
    }

    /// Returns the terminating fault, if any.
    #[must_use]
    pub fn fault(&self) -> Option<&FaultError> {
        self.outcome.exception()
    }

    /// Classifies the terminating fault, if any.
    #[must_use]
    pub fn fault_kind(&self) -> Option<FaultKind> {
        self.outcome.exception().map(FaultError::kind)
    }

    /// Returns the full outcome.
    #[must_use]
    pub fn outcome(&self) -> &Outcome<T> {
        &self.outcome
    }

    /// Consumes the report, yielding the outcome.
    #[must_use]
    pub fn into_outcome(self) -> Outcome<T> {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_report() {
        let report = ExecutionReport::new(Outcome::Result(5));
        assert!(report.is_success());
        assert_eq!(report.final_result(), Some(&5));
        assert!(report.fault().is_none());
        assert!(report.fault_kind().is_none());
    }

    #[test]
    fn test_failure_report() {
        let report: ExecutionReport<i32> =
            ExecutionReport::new(Outcome::Exception(FaultError::BulkheadRejected));
        assert!(!report.is_success());
        assert_eq!(report.fault_kind(), Some(FaultKind::Bulkhead));
    }
}
