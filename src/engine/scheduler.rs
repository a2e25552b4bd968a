//! Decides whether a dependency is due for a check

use chrono::{DateTime, Utc};

use crate::model::DependencyRecord;

/// Scheduling decision for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Due,
    NotDue { next_check: DateTime<Utc> },
    /// Monitoring is turned off; reported as skipped, never checked
    Disabled,
}

/// When the record becomes due again; None means due immediately
pub fn next_check(record: &DependencyRecord) -> Option<DateTime<Utc>> {
    record
        .last_checked
        .map(|last| last + record.monitoring.check_frequency.interval())
}

pub fn decide(record: &DependencyRecord, now: DateTime<Utc>) -> Schedule {
    if !record.monitoring.enabled {
        return Schedule::Disabled;
    }

    match next_check(record) {
        Some(next_check) if now < next_check => Schedule::NotDue { next_check },
        _ => Schedule::Due,
    }
}

/// A record is due once its check interval has fully elapsed since the last
/// successful check. Records never checked are always due, disabled ones never.
pub fn is_due(record: &DependencyRecord, now: DateTime<Utc>) -> bool {
    decide(record, now) == Schedule::Due
}
