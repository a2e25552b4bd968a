//! Severity classification of detected changes

use crate::engine::change::{ChangeDetection, Severity, StructuralDiff};
use crate::engine::semver::parse_version;

/// Classify a change into {breaking, major, minor}.
///
/// Rules, first match wins:
/// 1. nothing changed: minor
/// 2. both versions parse and differ: major bump is breaking, minor bump is
///    major, patch bump is minor, anything else (a downgrade) is major
/// 3. a structural diff is present: removals or retyped fields are breaking,
///    additions only are major
/// 4. content-hash-only changes, including degraded observations: minor
pub fn classify(change: &ChangeDetection) -> Severity {
    if !change.has_changed() {
        return Severity::Minor;
    }

    if let Some(severity) = classify_version_delta(
        change.old_version.as_deref(),
        change.new_version.as_deref(),
    ) {
        return severity;
    }

    if change.degraded {
        return Severity::Minor;
    }

    change
        .structural_diff
        .as_ref()
        .map(classify_structural_diff)
        .unwrap_or(Severity::Minor)
}

/// Classify and attach the severity when the change is non-empty
pub fn classified(change: ChangeDetection) -> ChangeDetection {
    let severity = classify(&change);
    change.with_severity(severity)
}

/// Returns None when either side is missing or unparsable, or when both
/// denote the same version so the other rules can decide
pub fn classify_version_delta(old: Option<&str>, new: Option<&str>) -> Option<Severity> {
    let old = parse_version(old?)?;
    let new = parse_version(new?)?;

    if old == new {
        return None;
    }

    let severity = if new.major > old.major {
        Severity::Breaking
    } else if new.major == old.major && new.minor > old.minor {
        Severity::Major
    } else if new.major == old.major && new.minor == old.minor && new.patch >= old.patch {
        Severity::Minor
    } else {
        // apparent downgrade
        Severity::Major
    };

    Some(severity)
}

pub fn classify_structural_diff(diff: &StructuralDiff) -> Severity {
    if diff.has_incompatible_changes() {
        Severity::Breaking
    } else if diff.has_additions() {
        Severity::Major
    } else {
        Severity::Minor
    }
}
