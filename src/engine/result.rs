//! Per-dependency outcomes of a monitor pass and the batch statistics derived from them

use serde::Serialize;

use crate::engine::change::{ChangeDetection, ChangeKind, Severity};
use crate::engine::error::CheckError;
use crate::model::{DependencyRecord, RecordUpdate, Snapshot};

/// Why a record was not checked in this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    Disabled,
    NotDue,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::NotDue => "not-due",
        }
    }
}

#[derive(Debug)]
pub enum CheckOutcome {
    Skipped(SkipReason),
    Checked {
        snapshot: Snapshot,
        change: ChangeDetection,
    },
    Failed(CheckError),
}

/// Outcome of one dependency in a monitor pass.
///
/// A checked result carries a snapshot and never an error; a failed result
/// carries an error and never a snapshot.
#[derive(Debug)]
pub struct CheckResult {
    pub dependency: DependencyRecord,
    pub outcome: CheckOutcome,
    /// Quota dropped to the warning threshold or was refused for this check
    pub rate_limit_warning: bool,
}

impl CheckResult {
    pub fn skipped(dependency: DependencyRecord, reason: SkipReason) -> Self {
        Self {
            dependency,
            outcome: CheckOutcome::Skipped(reason),
            rate_limit_warning: false,
        }
    }

    pub fn checked(dependency: DependencyRecord, snapshot: Snapshot, change: ChangeDetection) -> Self {
        Self {
            dependency,
            outcome: CheckOutcome::Checked { snapshot, change },
            rate_limit_warning: false,
        }
    }

    pub fn failed(dependency: DependencyRecord, error: CheckError) -> Self {
        let rate_limit_warning = error.is_quota();
        Self {
            dependency,
            outcome: CheckOutcome::Failed(error),
            rate_limit_warning,
        }
    }

    pub fn with_rate_limit_warning(mut self, warning: bool) -> Self {
        self.rate_limit_warning |= warning;
        self
    }

    pub fn has_changed(&self) -> bool {
        self.change().is_some_and(ChangeDetection::has_changed)
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match &self.outcome {
            CheckOutcome::Checked { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    pub fn change(&self) -> Option<&ChangeDetection> {
        match &self.outcome {
            CheckOutcome::Checked { change, .. } => Some(change),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CheckError> {
        match &self.outcome {
            CheckOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn severity(&self) -> Option<Severity> {
        self.change().and_then(ChangeDetection::severity)
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match &self.outcome {
            CheckOutcome::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_reason().is_some()
    }

    /// Changed and not muted by `ignoreChanges`
    pub fn should_notify(&self) -> bool {
        self.has_changed() && !self.dependency.monitoring.ignore_changes
    }

    /// State to write back; only successful checks produce one
    pub fn update(&self) -> Option<RecordUpdate> {
        self.snapshot()
            .map(|snapshot| RecordUpdate::from_snapshot(&self.dependency.id, snapshot))
    }

    /// Copy of the dependency with this result folded in
    pub fn updated_record(&self) -> DependencyRecord {
        let mut record = self.dependency.clone();
        if let Some(update) = self.update() {
            update.apply_to(&mut record);
        }
        record
    }

    /// Change labels for display, empty unless changed
    pub fn change_labels(&self) -> Vec<ChangeKind> {
        self.change()
            .map(|change| change.changes().collect())
            .unwrap_or_default()
    }
}

/// Folds successful results back into updated copies of their records.
///
/// Results are matched to records by id; records without a successful result
/// are returned unchanged.
pub fn apply_results(records: &[DependencyRecord], results: &[CheckResult]) -> Vec<DependencyRecord> {
    records
        .iter()
        .map(|record| {
            results
                .iter()
                .find(|result| result.dependency.id == record.id)
                .and_then(CheckResult::update)
                .map(|update| {
                    let mut record = record.clone();
                    update.apply_to(&mut record);
                    record
                })
                .unwrap_or_else(|| record.clone())
        })
        .collect()
}

/// Batch statistics, derived only from per-record results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    /// Records a check was attempted for, whether it succeeded or failed
    pub checked: usize,
    pub skipped: usize,
    pub changed: usize,
    pub errors: usize,
    pub rate_limit_warnings: usize,
    pub breaking: usize,
    pub major: usize,
    pub minor: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[CheckResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Default::default()
        };

        for result in results {
            match &result.outcome {
                CheckOutcome::Skipped(_) => summary.skipped += 1,
                CheckOutcome::Failed(_) => {
                    summary.checked += 1;
                    summary.errors += 1;
                }
                CheckOutcome::Checked { change, .. } => {
                    summary.checked += 1;
                    if change.has_changed() {
                        summary.changed += 1;
                    }
                    match change.severity() {
                        Some(Severity::Breaking) => summary.breaking += 1,
                        Some(Severity::Major) => summary.major += 1,
                        Some(Severity::Minor) => summary.minor += 1,
                        None => {}
                    }
                }
            }
            if result.rate_limit_warning {
                summary.rate_limit_warnings += 1;
            }
        }

        summary
    }
}
