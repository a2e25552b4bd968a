//! Change detection output types

use indexmap::IndexSet;
use serde::Serialize;

/// Impact of a detected change, ordered `Minor < Major < Breaking`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Breaking,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Breaking => "breaking",
        }
    }
}

/// Category label of a detected change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChangeKind {
    #[serde(rename = "content")]
    Content,
    #[serde(rename = "version")]
    Version,
    #[serde(rename = "metadata")]
    Metadata,
    #[serde(rename = "lastUpdated")]
    LastUpdated,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Content => "content",
            ChangeKind::Version => "version",
            ChangeKind::Metadata => "metadata",
            ChangeKind::LastUpdated => "lastUpdated",
        }
    }
}

/// A field whose declared type differs between two interface descriptions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTypeChange {
    pub field: String,
    pub old_type: String,
    pub new_type: String,
}

/// Structural difference between two interface descriptions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralDiff {
    pub added_operations: Vec<String>,
    pub removed_operations: Vec<String>,
    pub added_fields: Vec<String>,
    pub removed_fields: Vec<String>,
    pub changed_field_types: Vec<FieldTypeChange>,
}

impl StructuralDiff {
    pub fn is_empty(&self) -> bool {
        self.added_operations.is_empty()
            && self.removed_operations.is_empty()
            && self.added_fields.is_empty()
            && self.removed_fields.is_empty()
            && self.changed_field_types.is_empty()
    }

    /// Removed operations, removed fields and retyped fields break clients
    pub fn has_incompatible_changes(&self) -> bool {
        !self.removed_operations.is_empty()
            || !self.removed_fields.is_empty()
            || !self.changed_field_types.is_empty()
    }

    pub fn has_additions(&self) -> bool {
        !self.added_operations.is_empty() || !self.added_fields.is_empty()
    }
}

/// Result of comparing two snapshots of the same dependency
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDetection {
    changes: IndexSet<ChangeKind>,
    pub old_version: Option<String>,
    pub new_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structural_diff: Option<StructuralDiff>,
    /// Either side came from a fallback observation path
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<Severity>,
}

impl ChangeDetection {
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Adds a label; a label already present keeps its original position
    pub fn record(&mut self, kind: ChangeKind) {
        self.changes.insert(kind);
    }

    pub fn has_changed(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn changes(&self) -> impl Iterator<Item = ChangeKind> + '_ {
        self.changes.iter().copied()
    }

    pub fn contains(&self, kind: ChangeKind) -> bool {
        self.changes.contains(&kind)
    }

    /// Present only when something changed
    pub fn severity(&self) -> Option<Severity> {
        self.severity
    }

    /// Attaches a severity; ignored when nothing changed
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = self.has_changed().then_some(severity);
        self
    }
}
