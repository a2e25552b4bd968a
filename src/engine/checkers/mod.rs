//! Checker implementations, one per access method

pub mod api_spec;
pub mod docs_api;
pub mod http_content;
pub mod repository;

pub use api_spec::ApiSpecChecker;
pub use docs_api::DocsApiChecker;
pub use http_content::HttpContentChecker;
pub use repository::RepositoryChecker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::config::{FETCH_TIMEOUT_MS, MonitorConfig, USER_AGENT};
use crate::engine::checker::Checker;
use crate::engine::error::CheckError;
use crate::engine::rate_limit::RateLimitHandler;
use crate::model::AccessMethod;

/// Checkers keyed by the access method they handle
#[derive(Clone, Default)]
pub struct CheckerRegistry {
    checkers: HashMap<AccessMethod, Arc<dyn Checker>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a checker, replacing any previous one for the same method
    pub fn register(&mut self, checker: Arc<dyn Checker>) {
        self.checkers.insert(checker.access_method(), checker);
    }

    pub fn with(mut self, checker: Arc<dyn Checker>) -> Self {
        self.register(checker);
        self
    }

    pub fn get(&self, access_method: AccessMethod) -> Option<&Arc<dyn Checker>> {
        self.checkers.get(&access_method)
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}

/// Create the default set of checkers for all supported access methods
pub fn create_default_checkers(
    config: &MonitorConfig,
    rate_limiter: Arc<RateLimitHandler>,
) -> CheckerRegistry {
    let repository =
        RepositoryChecker::new(&config.endpoints.github_api, rate_limiter).with_token(config.github_token());

    CheckerRegistry::new()
        .with(Arc::new(repository))
        .with(Arc::new(HttpContentChecker::default()))
        .with(Arc::new(ApiSpecChecker::default()))
        .with(Arc::new(DocsApiChecker::new(&config.endpoints.docs_api)))
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_millis(FETCH_TIMEOUT_MS))
        .build()
        .expect("Failed to create HTTP client")
}

/// Raw page as returned by a plain GET
#[derive(Debug, Clone)]
pub(crate) struct Page {
    pub status: reqwest::StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

impl Page {
    /// Turns a non-2xx page into the matching hard error
    pub fn ensure_success(self, url: &str) -> Result<Page, CheckError> {
        if self.status == reqwest::StatusCode::NOT_FOUND {
            return Err(CheckError::NotFound(url.to_string()));
        }

        if !self.status.is_success() {
            warn!("{} returned status {}", url, self.status);
            return Err(CheckError::HttpStatus {
                status: self.status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(self)
    }
}

pub(crate) async fn get_page(client: &reqwest::Client, url: &str) -> Result<Page, CheckError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await?;

    Ok(Page {
        status,
        content_type,
        body,
    })
}
