//! GitHub repository checker based on the latest published release

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::engine::checker::Checker;
use crate::engine::checkers::http_client;
use crate::engine::error::CheckError;
use crate::engine::normalizer::hash_content;
use crate::engine::rate_limit::{Quota, RateLimitHandler};
use crate::model::{AccessMethod, DependencyRecord, Snapshot, keys};

/// Response from GitHub latest release API
#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    name: Option<String>,
    published_at: Option<String>,
}

/// Response from GitHub repository API
#[derive(Debug, Deserialize)]
struct Repository {
    pushed_at: Option<String>,
    default_branch: Option<String>,
}

/// Extracts `owner/repo` from the supported repository URL forms:
/// `https://github.com/owner/repo[.git][/...]`, `git@github.com:owner/repo.git`
/// and `github:owner/repo`.
pub fn parse_repository(url: &str) -> Option<(String, String)> {
    let url = url.trim();
    let path = if let Some(rest) = url.strip_prefix("git@github.com:") {
        rest
    } else if let Some(rest) = url.strip_prefix("github:") {
        rest
    } else {
        let without_scheme = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        let without_www = without_scheme
            .strip_prefix("www.")
            .unwrap_or(without_scheme);
        without_www.strip_prefix("github.com/")?
    };

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    let repo = repo
        .split(['?', '#'])
        .next()
        .filter(|r| !r.is_empty())?;

    Some((owner.to_string(), repo.to_string()))
}

/// Checker implementation for GitHub repositories
pub struct RepositoryChecker {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    rate_limiter: Arc<RateLimitHandler>,
}

impl RepositoryChecker {
    /// Creates a new RepositoryChecker with a custom base URL
    pub fn new(base_url: &str, rate_limiter: Arc<RateLimitHandler>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            rate_limiter,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, CheckError> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if let Some(quota) = quota_from_headers(response.headers()) {
            self.rate_limiter.observe(quota);
        }
        Ok(response)
    }

    /// Returns None when the repository has no published release
    async fn latest_release(&self, owner: &str, repo: &str) -> Result<Option<Release>, CheckError> {
        let url = format!("{}/repos/{}/{}/releases/latest", self.base_url, owner, repo);
        let response = self.get(&url).await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("No release published for {}/{}", owner, repo);
            return Ok(None);
        }

        ensure_not_rate_limited(&response)?;

        if !status.is_success() {
            warn!("GitHub API returned status {}: {}", status, url);
            return Err(CheckError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let release = response.json::<Release>().await.map_err(|e| {
            warn!("Failed to parse GitHub release response: {}", e);
            CheckError::InvalidResponse(e.to_string())
        })?;

        Ok(Some(release))
    }

    /// Second API call of a check, so it claims its own quota unit
    async fn repository(&self, owner: &str, repo: &str) -> Result<Repository, CheckError> {
        self.rate_limiter.reserve(1)?;

        let url = format!("{}/repos/{}/{}", self.base_url, owner, repo);
        let response = self.get(&url).await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CheckError::NotFound(format!("{}/{}", owner, repo)));
        }

        ensure_not_rate_limited(&response)?;

        if !status.is_success() {
            warn!("GitHub API returned status {}: {}", status, url);
            return Err(CheckError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        response.json::<Repository>().await.map_err(|e| {
            warn!("Failed to parse GitHub repository response: {}", e);
            CheckError::InvalidResponse(e.to_string())
        })
    }
}

fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn quota_from_headers(headers: &HeaderMap) -> Option<Quota> {
    let limit = header_value::<u32>(headers, "x-ratelimit-limit")?;
    let remaining = header_value::<u32>(headers, "x-ratelimit-remaining")?;
    let reset = header_value::<i64>(headers, "x-ratelimit-reset")?;
    let reset_at = DateTime::<Utc>::from_timestamp(reset, 0)?;

    Some(Quota {
        limit,
        remaining,
        reset_at,
    })
}

/// 429, or 403 with no remaining quota, means the primary rate limit was hit
fn ensure_not_rate_limited(response: &reqwest::Response) -> Result<(), CheckError> {
    let status = response.status();
    let exhausted = header_value::<u32>(response.headers(), "x-ratelimit-remaining") == Some(0);

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || (status == reqwest::StatusCode::FORBIDDEN && exhausted)
    {
        let reset_at = header_value::<i64>(response.headers(), "x-ratelimit-reset")
            .and_then(|reset| DateTime::<Utc>::from_timestamp(reset, 0));
        return Err(CheckError::RateLimited { reset_at });
    }

    Ok(())
}

#[async_trait::async_trait]
impl Checker for RepositoryChecker {
    fn access_method(&self) -> AccessMethod {
        AccessMethod::RepositoryApi
    }

    /// The latest-release lookup; the repository fallback reserves its own
    fn quota_cost(&self) -> u32 {
        1
    }

    async fn fetch(&self, record: &DependencyRecord) -> Result<Snapshot, CheckError> {
        let (owner, repo) = parse_repository(&record.url)
            .ok_or_else(|| CheckError::InvalidSource(record.url.clone()))?;
        let full_name = format!("{}/{}", owner, repo);

        let snapshot = match self.latest_release(&owner, &repo).await? {
            Some(release) => {
                let fingerprint = format!(
                    "{}@{}@{}",
                    full_name,
                    release.tag_name,
                    release.published_at.as_deref().unwrap_or_default()
                );
                let mut snapshot = Snapshot::new(hash_content(&fingerprint), Utc::now())
                    .with_version(Some(release.tag_name))
                    .with_metadata(keys::REPOSITORY, full_name.as_str());
                if let Some(name) = release.name {
                    snapshot = snapshot.with_metadata(keys::RELEASE_NAME, name);
                }
                if let Some(published_at) = release.published_at {
                    snapshot = snapshot.with_metadata(keys::PUBLISHED_AT, published_at);
                }
                snapshot
            }
            None => {
                let repository = self.repository(&owner, &repo).await?;
                let fingerprint = format!(
                    "{}@{}@{}",
                    full_name,
                    repository.default_branch.as_deref().unwrap_or_default(),
                    repository.pushed_at.as_deref().unwrap_or_default()
                );
                let mut snapshot = Snapshot::new(hash_content(&fingerprint), Utc::now())
                    .with_metadata(keys::REPOSITORY, full_name.as_str());
                if let Some(pushed_at) = repository.pushed_at {
                    snapshot = snapshot.with_metadata(keys::PUSHED_AT, pushed_at);
                }
                snapshot
            }
        };

        Ok(snapshot)
    }
}
