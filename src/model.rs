//! Dependency records and snapshots shared by the engine and its collaborators

use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Opaque, access-method specific key/value bag attached to a snapshot
pub type Metadata = IndexMap<String, serde_json::Value>;

/// Well-known metadata keys written by the checkers
pub mod keys {
    pub const CONTENT_TYPE: &str = "contentType";
    pub const DEGRADED: &str = "degraded";
    pub const SOURCE: &str = "source";
    pub const REPOSITORY: &str = "repository";
    pub const RELEASE_NAME: &str = "releaseName";
    pub const PUBLISHED_AT: &str = "publishedAt";
    pub const PUSHED_AT: &str = "pushedAt";
    pub const LIBRARY_ID: &str = "libraryId";
    pub const TITLE: &str = "title";
    pub const LAST_UPDATED: &str = "lastUpdated";
    pub const STRUCTURED: &str = "structured";
    pub const OPERATIONS: &str = "operations";
    pub const FIELD_TYPES: &str = "fieldTypes";
    pub const SPEC_LOCATION: &str = "specLocation";
}

/// Strategy used to observe a dependency's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMethod {
    /// Repository hosting API (latest release / last push)
    RepositoryApi,
    /// Raw HTTP content, normalized and hashed
    HttpContent,
    /// Machine-readable interface description (OpenAPI / Swagger)
    ApiSpec,
    /// Documentation index with a structured metadata endpoint
    DocsApi,
}

impl AccessMethod {
    /// Returns the string representation of the access method
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMethod::RepositoryApi => "repository-api",
            AccessMethod::HttpContent => "http-content",
            AccessMethod::ApiSpec => "api-spec",
            AccessMethod::DocsApi => "docs-api",
        }
    }
}

impl std::str::FromStr for AccessMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repository-api" => Ok(AccessMethod::RepositoryApi),
            "http-content" => Ok(AccessMethod::HttpContent),
            "api-spec" => Ok(AccessMethod::ApiSpec),
            "docs-api" => Ok(AccessMethod::DocsApi),
            _ => Err(()),
        }
    }
}

/// How often a dependency should be re-checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckFrequency {
    Hourly,
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl CheckFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckFrequency::Hourly => "hourly",
            CheckFrequency::Daily => "daily",
            CheckFrequency::Weekly => "weekly",
            CheckFrequency::Monthly => "monthly",
        }
    }

    /// Minimum time between two checks
    pub fn interval(&self) -> TimeDelta {
        match self {
            CheckFrequency::Hourly => TimeDelta::hours(1),
            CheckFrequency::Daily => TimeDelta::hours(24),
            CheckFrequency::Weekly => TimeDelta::days(7),
            CheckFrequency::Monthly => TimeDelta::days(30),
        }
    }
}

impl std::str::FromStr for CheckFrequency {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(CheckFrequency::Hourly),
            "daily" => Ok(CheckFrequency::Daily),
            "weekly" => Ok(CheckFrequency::Weekly),
            "monthly" => Ok(CheckFrequency::Monthly),
            _ => Err(()),
        }
    }
}

/// Effective monitoring policy for one dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitoringSettings {
    pub enabled: bool,
    pub check_frequency: CheckFrequency,
    /// Still checked and written back, but never notified
    pub ignore_changes: bool,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_frequency: CheckFrequency::Daily,
            ignore_changes: false,
        }
    }
}

/// One tracked external resource, as owned by the manifest store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRecord {
    pub id: String,
    pub url: String,
    pub access_method: AccessMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Last known fingerprint; empty until the first successful check
    #[serde(default)]
    pub current_state_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub monitoring: MonitoringSettings,
}

impl DependencyRecord {
    pub fn new(id: impl Into<String>, url: impl Into<String>, access_method: AccessMethod) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            access_method,
            name: None,
            description: None,
            current_state_hash: String::new(),
            current_version: None,
            state_metadata: None,
            last_checked: None,
            monitoring: MonitoringSettings::default(),
        }
    }

    pub fn with_state_hash(mut self, hash: impl Into<String>) -> Self {
        self.current_state_hash = hash.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = Some(version.into());
        self
    }

    pub fn with_state_metadata(mut self, metadata: Metadata) -> Self {
        self.state_metadata = Some(metadata);
        self
    }

    pub fn with_last_checked(mut self, last_checked: DateTime<Utc>) -> Self {
        self.last_checked = Some(last_checked);
        self
    }

    pub fn with_monitoring(mut self, monitoring: MonitoringSettings) -> Self {
        self.monitoring = monitoring;
        self
    }

    /// True until the first successful check has produced a baseline
    pub fn has_baseline(&self) -> bool {
        !self.current_state_hash.is_empty()
    }

    /// Snapshot representing the persisted state of this record.
    ///
    /// A record whose state was seeded by hand (hash and maybe version, no
    /// metadata) takes the unknown fields from `current`, so they never count
    /// as a change. Once a check has written state back, a missing version
    /// means the source had none.
    pub fn baseline_snapshot(&self, current: &Snapshot) -> Snapshot {
        let (version, metadata) = match &self.state_metadata {
            Some(metadata) => (self.current_version.clone(), metadata.clone()),
            None => (
                self.current_version
                    .clone()
                    .or_else(|| current.version.clone()),
                current.metadata.clone(),
            ),
        };

        Snapshot {
            version,
            state_hash: self.current_state_hash.clone(),
            fetched_at: self.last_checked.unwrap_or(current.fetched_at),
            metadata,
        }
    }
}

/// Point-in-time observation of one dependency, produced by a checker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: Option<String>,
    pub state_hash: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Snapshot {
    pub fn new(state_hash: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            version: None,
            state_hash: state_hash.into(),
            fetched_at,
            metadata: Metadata::new(),
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Snapshot was produced by a fallback path with weaker provenance
    pub fn is_degraded(&self) -> bool {
        self.metadata
            .get(keys::DEGRADED)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }
}

/// State written back to the manifest store after a successful check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    pub id: String,
    pub current_state_hash: String,
    pub current_version: Option<String>,
    pub state_metadata: Metadata,
    pub last_checked: DateTime<Utc>,
}

impl RecordUpdate {
    pub fn from_snapshot(id: &str, snapshot: &Snapshot) -> Self {
        Self {
            id: id.to_string(),
            current_state_hash: snapshot.state_hash.clone(),
            current_version: snapshot.version.clone(),
            state_metadata: snapshot.metadata.clone(),
            last_checked: snapshot.fetched_at,
        }
    }

    pub fn apply_to(&self, record: &mut DependencyRecord) {
        record.current_state_hash = self.current_state_hash.clone();
        record.current_version = self.current_version.clone();
        record.state_metadata = Some(self.state_metadata.clone());
        record.last_checked = Some(self.last_checked);
    }
}
