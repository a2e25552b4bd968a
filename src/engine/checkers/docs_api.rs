//! Documentation index checker
//!
//! Prefers the index's structured metadata endpoint. When the endpoint is
//! unavailable or answers with something unusable, the page itself is
//! fingerprinted and the snapshot is flagged as degraded.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::engine::change::{ChangeDetection, ChangeKind};
use crate::engine::checker::Checker;
use crate::engine::checkers::http_content::page_snapshot;
use crate::engine::checkers::{get_page, http_client};
use crate::engine::comparator::compare_snapshots;
use crate::engine::error::CheckError;
use crate::engine::fallback::{Attempt, FallbackChain, Strategy};
use crate::engine::normalizer::{canonical_json, hash_content};
use crate::model::{AccessMethod, DependencyRecord, Snapshot, keys};

/// Response from the documentation index metadata endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LibraryInfo {
    id: String,
    title: Option<String>,
    version: Option<String>,
    last_updated: Option<String>,
    total_snippets: Option<u64>,
}

/// Derives the index's library id (`/host/path`) from a documentation URL
pub fn library_id(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    let path = parsed.path().trim_end_matches('/');

    Some(format!("/{}{}", host, path))
}

struct MetadataEndpoint<'a> {
    client: &'a reqwest::Client,
    endpoint: String,
}

#[async_trait::async_trait]
impl Strategy for MetadataEndpoint<'_> {
    fn name(&self) -> &'static str {
        "metadata-api"
    }

    async fn attempt(&self) -> Result<Attempt, CheckError> {
        let response = match self.client.get(&self.endpoint).send().await {
            Ok(response) => response,
            Err(e) => return Ok(Attempt::Next(format!("endpoint unreachable: {}", e))),
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND
            || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        {
            info!("Docs metadata endpoint returned {}, degrading to raw page", status);
            return Ok(Attempt::Next(format!("endpoint returned {}", status)));
        }

        if !status.is_success() {
            warn!("Docs metadata endpoint returned status {}: {}", status, self.endpoint);
            return Ok(Attempt::Next(format!("endpoint returned {}", status)));
        }

        let info = match response.json::<LibraryInfo>().await {
            Ok(info) => info,
            Err(e) => {
                warn!("Failed to parse docs metadata response: {}", e);
                return Ok(Attempt::Next(format!("malformed response: {}", e)));
            }
        };

        let fingerprint = canonical_json(&json!({
            "id": info.id,
            "version": info.version,
            "lastUpdated": info.last_updated,
            "totalSnippets": info.total_snippets,
        }));

        let mut snapshot = Snapshot::new(hash_content(&fingerprint), Utc::now())
            .with_version(info.version)
            .with_metadata(keys::LIBRARY_ID, info.id)
            .with_metadata(keys::DEGRADED, false);
        if let Some(title) = info.title {
            snapshot = snapshot.with_metadata(keys::TITLE, title);
        }
        if let Some(last_updated) = info.last_updated {
            snapshot = snapshot.with_metadata(keys::LAST_UPDATED, last_updated);
        }

        Ok(Attempt::Resolved(snapshot))
    }
}

struct RawPage<'a> {
    client: &'a reqwest::Client,
    url: &'a str,
}

#[async_trait::async_trait]
impl Strategy for RawPage<'_> {
    fn name(&self) -> &'static str {
        "raw-page"
    }

    async fn attempt(&self) -> Result<Attempt, CheckError> {
        let page = get_page(self.client, self.url)
            .await?
            .ensure_success(self.url)?;

        Ok(Attempt::Resolved(
            page_snapshot(page.content_type.as_deref(), &page.body)
                .with_metadata(keys::DEGRADED, true),
        ))
    }
}

/// Checker implementation for documentation indexes
pub struct DocsApiChecker {
    client: reqwest::Client,
    base_url: String,
}

impl DocsApiChecker {
    /// Creates a new DocsApiChecker with a custom index base URL
    pub fn new(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Checker for DocsApiChecker {
    fn access_method(&self) -> AccessMethod {
        AccessMethod::DocsApi
    }

    async fn fetch(&self, record: &DependencyRecord) -> Result<Snapshot, CheckError> {
        let library_id =
            library_id(&record.url).ok_or_else(|| CheckError::InvalidSource(record.url.clone()))?;

        FallbackChain::new()
            .then(MetadataEndpoint {
                client: &self.client,
                endpoint: format!("{}/v1/libraries{}", self.base_url, library_id),
            })
            .then(RawPage {
                client: &self.client,
                url: &record.url,
            })
            .run(&record.url)
            .await
    }

    /// Generic comparison plus a `lastUpdated` label
    fn compare(&self, previous: &Snapshot, current: &Snapshot) -> ChangeDetection {
        let mut change = compare_snapshots(previous, current);

        if previous.metadata.get(keys::LAST_UPDATED) != current.metadata.get(keys::LAST_UPDATED) {
            change.record(ChangeKind::LastUpdated);
        }

        change
    }
}
