//! Raw HTTP content checker

use chrono::Utc;
use tracing::debug;

use crate::engine::checker::Checker;
use crate::engine::checkers::{get_page, http_client};
use crate::engine::error::CheckError;
use crate::engine::normalizer::fingerprint;
use crate::model::{AccessMethod, DependencyRecord, Snapshot, keys};

/// Fetches a URL and fingerprints its normalized body
pub struct HttpContentChecker {
    client: reqwest::Client,
}

impl HttpContentChecker {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for HttpContentChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of a raw page: markup canonicalized, other text whitespace-collapsed
pub(crate) fn page_snapshot(content_type: Option<&str>, body: &str) -> Snapshot {
    let mut snapshot = Snapshot::new(fingerprint(content_type, body), Utc::now());
    if let Some(content_type) = content_type {
        snapshot = snapshot.with_metadata(keys::CONTENT_TYPE, content_type);
    }
    snapshot
}

#[async_trait::async_trait]
impl Checker for HttpContentChecker {
    fn access_method(&self) -> AccessMethod {
        AccessMethod::HttpContent
    }

    async fn fetch(&self, record: &DependencyRecord) -> Result<Snapshot, CheckError> {
        let page = get_page(&self.client, &record.url)
            .await?
            .ensure_success(&record.url)?;

        debug!(
            "Fetched {} bytes from {} ({:?})",
            page.body.len(),
            record.url,
            page.content_type
        );

        Ok(page_snapshot(page.content_type.as_deref(), &page.body))
    }
}
