//! Optimistic concurrency control primitive.

use crate::error::{DomainError, DomainResult};

/// Version expectation supplied with a conditional write.
///
/// Shared, concurrently-mutated records (product stock) carry a monotonically
/// increasing version token. A writer reads `(state, version)`, computes the
/// new state, and submits the write together with the version it read. The
/// store applies the write only if the stored version still matches; a
/// mismatch means another writer got there first and the caller must re-read
/// and retry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (seeding, migrations, test fixtures).
    Any,
    /// Require the record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
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
