//! Checker-agnostic comparison of two snapshots

use crate::engine::change::{ChangeDetection, ChangeKind};
use crate::model::{Metadata, Snapshot};

/// Compare two snapshots of the same dependency
///
/// Labels are emitted in a fixed order: content (state hash), version,
/// metadata. The metadata check is shallow: only the key count and the
/// top-level values are compared.
pub fn compare_snapshots(old: &Snapshot, new: &Snapshot) -> ChangeDetection {
    let mut change = ChangeDetection::unchanged();

    if old.state_hash != new.state_hash {
        change.record(ChangeKind::Content);
    }

    if old.version != new.version {
        change.record(ChangeKind::Version);
    }

    if metadata_differs(&old.metadata, &new.metadata) {
        change.record(ChangeKind::Metadata);
    }

    change.old_version = old.version.clone();
    change.new_version = new.version.clone();
    change.degraded = old.is_degraded() || new.is_degraded();
    change
}

fn metadata_differs(old: &Metadata, new: &Metadata) -> bool {
    old.len() != new.len()
        || old
            .iter()
            .any(|(key, value)| new.get(key).is_none_or(|other| other != value))
}
