//! Checker trait for observing the state of one dependency

#[cfg(test)]
use mockall::automock;

use crate::engine::change::ChangeDetection;
use crate::engine::comparator::compare_snapshots;
use crate::engine::error::CheckError;
use crate::model::{AccessMethod, DependencyRecord, Snapshot};

/// Trait implemented once per access method
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Returns the access method this implementation handles
    fn access_method(&self) -> AccessMethod;

    /// Quota units one fetch consumes against the shared rate-limited API
    ///
    /// Checkers that only touch arbitrary HTTP endpoints consume none.
    fn quota_cost(&self) -> u32 {
        0
    }

    /// Fetches the current state of the dependency as a normalized snapshot
    ///
    /// # Returns
    /// * `Ok(Snapshot)` - Fingerprint of the current observable state
    /// * `Err(CheckError)` - If the source cannot be resolved or fetched
    async fn fetch(&self, record: &DependencyRecord) -> Result<Snapshot, CheckError>;

    /// Compares a previous snapshot against a freshly fetched one
    ///
    /// Default implementation is the generic snapshot comparison. Override
    /// this when hash equality would miss semantically relevant changes.
    fn compare(&self, previous: &Snapshot, current: &Snapshot) -> ChangeDetection {
        compare_snapshots(previous, current)
    }
}
