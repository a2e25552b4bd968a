//! OpenAPI / Swagger interface description checker
//!
//! Observation order:
//! 1. the URL itself parsed as a JSON interface description
//! 2. the well-known `/openapi.json` location on the same origin
//! 3. a full-document hash of the page fetched in step 1
//!
//! Only a failure of the initial fetch is a hard error; every later miss
//! degrades to the next step.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::engine::change::{ChangeDetection, FieldTypeChange, StructuralDiff};
use crate::engine::checker::Checker;
use crate::engine::checkers::http_content::page_snapshot;
use crate::engine::checkers::{get_page, http_client};
use crate::engine::comparator::compare_snapshots;
use crate::engine::error::CheckError;
use crate::engine::fallback::{Attempt, FallbackChain, Strategy};
use crate::engine::normalizer::{canonical_json, hash_content};
use crate::model::{AccessMethod, DependencyRecord, Snapshot, keys};

const WELL_KNOWN_PATH: &str = "/openapi.json";

const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "patch", "head", "options", "trace",
];

/// Operations and field types extracted from an interface description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecStructure {
    /// `"METHOD /path"`, sorted
    pub operations: BTreeSet<String>,
    /// `"Schema.field"` to declared type
    pub field_types: BTreeMap<String, String>,
}

impl SpecStructure {
    /// Extracts the structure of an OpenAPI 3 or Swagger 2 document.
    ///
    /// Returns None when the document has no `paths` object.
    pub fn from_document(document: &Value) -> Option<Self> {
        let paths = document.get("paths")?.as_object()?;

        let operations = paths
            .iter()
            .flat_map(|(path, item)| {
                HTTP_METHODS
                    .iter()
                    .filter(|method| item.get(**method).is_some())
                    .map(move |method| format!("{} {}", method.to_ascii_uppercase(), path))
            })
            .collect();

        let schemas = document
            .pointer("/components/schemas")
            .or_else(|| document.get("definitions"))
            .and_then(Value::as_object);

        let mut field_types = BTreeMap::new();
        for (schema, definition) in schemas.into_iter().flatten() {
            let Some(properties) = definition.get("properties").and_then(Value::as_object) else {
                continue;
            };
            for (field, property) in properties {
                field_types.insert(format!("{}.{}", schema, field), type_name(property));
            }
        }

        Some(Self {
            operations,
            field_types,
        })
    }

    /// Reads back the structure stored in a snapshot's metadata
    pub fn from_snapshot(snapshot: &Snapshot) -> Option<Self> {
        let structured = snapshot
            .metadata
            .get(keys::STRUCTURED)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !structured {
            return None;
        }

        let operations = snapshot
            .metadata
            .get(keys::OPERATIONS)?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();

        let field_types = snapshot
            .metadata
            .get(keys::FIELD_TYPES)
            .and_then(Value::as_object)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|t| (k.clone(), t.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            operations,
            field_types,
        })
    }

    pub fn diff(&self, newer: &SpecStructure) -> StructuralDiff {
        let added_operations = newer
            .operations
            .difference(&self.operations)
            .cloned()
            .collect();
        let removed_operations = self
            .operations
            .difference(&newer.operations)
            .cloned()
            .collect();

        let mut removed_fields = Vec::new();
        let mut changed_field_types = Vec::new();
        for (field, old_type) in &self.field_types {
            match newer.field_types.get(field) {
                None => removed_fields.push(field.clone()),
                Some(new_type) if new_type != old_type => {
                    changed_field_types.push(FieldTypeChange {
                        field: field.clone(),
                        old_type: old_type.clone(),
                        new_type: new_type.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        let added_fields = newer
            .field_types
            .keys()
            .filter(|field| !self.field_types.contains_key(*field))
            .cloned()
            .collect();

        StructuralDiff {
            added_operations,
            removed_operations,
            added_fields,
            removed_fields,
            changed_field_types,
        }
    }
}

fn type_name(property: &Value) -> String {
    if let Some(reference) = property.get("$ref").and_then(Value::as_str) {
        return reference.rsplit('/').next().unwrap_or(reference).to_string();
    }

    match property.get("type").and_then(Value::as_str) {
        Some("array") => format!(
            "array<{}>",
            property
                .get("items")
                .map(type_name)
                .unwrap_or_else(|| "any".to_string())
        ),
        Some(kind) => match property.get("format").and_then(Value::as_str) {
            Some(format) => format!("{}({})", kind, format),
            None => kind.to_string(),
        },
        None => "any".to_string(),
    }
}

/// Builds a structured snapshot, or None if the document is not a spec
fn spec_snapshot(document: &Value, location: &str) -> Option<Snapshot> {
    let structure = SpecStructure::from_document(document)?;
    let version = document
        .pointer("/info/version")
        .and_then(Value::as_str)
        .map(str::to_string);

    let operations: Vec<Value> = structure
        .operations
        .iter()
        .map(|op| Value::String(op.clone()))
        .collect();
    let field_types: serde_json::Map<String, Value> = structure
        .field_types
        .into_iter()
        .map(|(field, kind)| (field, Value::String(kind)))
        .collect();

    Some(
        Snapshot::new(hash_content(&canonical_json(document)), chrono::Utc::now())
            .with_version(version)
            .with_metadata(keys::STRUCTURED, true)
            .with_metadata(keys::SPEC_LOCATION, location)
            .with_metadata(keys::OPERATIONS, operations)
            .with_metadata(keys::FIELD_TYPES, field_types),
    )
}

fn parse_spec(body: &str, location: &str) -> Attempt {
    match serde_json::from_str::<Value>(body) {
        Ok(document) => match spec_snapshot(&document, location) {
            Some(snapshot) => Attempt::Resolved(snapshot),
            None => Attempt::Next("document has no paths".to_string()),
        },
        Err(e) => Attempt::Next(format!("not a JSON document: {}", e)),
    }
}

/// Same-origin well-known location of the interface description
fn well_known_location(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let candidate = parsed.join(WELL_KNOWN_PATH).ok()?.to_string();
    (candidate != url).then_some(candidate)
}

struct InlineSpec<'a> {
    url: &'a str,
    body: &'a str,
}

#[async_trait::async_trait]
impl Strategy for InlineSpec<'_> {
    fn name(&self) -> &'static str {
        "inline-spec"
    }

    async fn attempt(&self) -> Result<Attempt, CheckError> {
        Ok(parse_spec(self.body, self.url))
    }
}

struct WellKnownSpec<'a> {
    client: &'a reqwest::Client,
    url: &'a str,
}

#[async_trait::async_trait]
impl Strategy for WellKnownSpec<'_> {
    fn name(&self) -> &'static str {
        "well-known-spec"
    }

    async fn attempt(&self) -> Result<Attempt, CheckError> {
        let Some(location) = well_known_location(self.url) else {
            return Ok(Attempt::Next("no distinct well-known location".to_string()));
        };

        let page = match get_page(self.client, &location).await {
            Ok(page) => page,
            Err(e) => return Ok(Attempt::Next(e.to_string())),
        };

        if !page.status.is_success() {
            return Ok(Attempt::Next(format!("{} returned {}", location, page.status)));
        }

        Ok(parse_spec(&page.body, &location))
    }
}

struct FullDocument<'a> {
    content_type: Option<&'a str>,
    body: &'a str,
}

#[async_trait::async_trait]
impl Strategy for FullDocument<'_> {
    fn name(&self) -> &'static str {
        "full-document"
    }

    async fn attempt(&self) -> Result<Attempt, CheckError> {
        Ok(Attempt::Resolved(
            page_snapshot(self.content_type, self.body).with_metadata(keys::STRUCTURED, false),
        ))
    }
}

/// Checker implementation for machine-readable interface descriptions
pub struct ApiSpecChecker {
    client: reqwest::Client,
}

impl ApiSpecChecker {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for ApiSpecChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Checker for ApiSpecChecker {
    fn access_method(&self) -> AccessMethod {
        AccessMethod::ApiSpec
    }

    async fn fetch(&self, record: &DependencyRecord) -> Result<Snapshot, CheckError> {
        let page = get_page(&self.client, &record.url)
            .await?
            .ensure_success(&record.url)?;

        FallbackChain::new()
            .then(InlineSpec {
                url: &record.url,
                body: &page.body,
            })
            .then(WellKnownSpec {
                client: &self.client,
                url: &record.url,
            })
            .then(FullDocument {
                content_type: page.content_type.as_deref(),
                body: &page.body,
            })
            .run(&record.url)
            .await
    }

    /// Generic comparison plus a structural diff when both sides are structured
    fn compare(&self, previous: &Snapshot, current: &Snapshot) -> ChangeDetection {
        let mut change = compare_snapshots(previous, current);

        if let (Some(old), Some(new)) = (
            SpecStructure::from_snapshot(previous),
            SpecStructure::from_snapshot(current),
        ) {
            let diff = old.diff(&new);
            if !diff.is_empty() {
                change.structural_diff = Some(diff);
            }
        }

        change
    }
}
