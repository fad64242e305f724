//! Optimistic concurrency expectations for stored records.

use crate::error::{DomainError, DomainResult};

/// Optimistic concurrency expectation for a record.
///
/// Record versions start at 1 on first write and increase by one per write;
/// version 0 means "the record does not exist".
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (blind writes).
    Any,
    /// Require the record to be at an exact version (0 = absent).
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation that the record does not exist yet.
    pub const ABSENT: ExpectedVersion = ExpectedVersion::Exact(0);

    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}
