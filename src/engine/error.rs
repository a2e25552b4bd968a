use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure of one dependency's check pipeline.
///
/// Always attached to the record's own result; never aborts a batch.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Cannot resolve source from url: {0}")]
    InvalidSource(String),

    #[error("No checker registered for access method: {0}")]
    UnsupportedAccessMethod(&'static str),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited until {reset_at:?}")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("API quota exhausted: {remaining} remaining, resets at {reset_at}")]
    QuotaExhausted {
        remaining: u32,
        reset_at: DateTime<Utc>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Check did not complete before the deadline")]
    Timeout,
}

impl CheckError {
    /// Fatal for the dependency until its configuration changes
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CheckError::InvalidSource(_) | CheckError::UnsupportedAccessMethod(_)
        )
    }

    /// Recoverable by a future scheduled pass
    pub fn is_transient(&self) -> bool {
        !self.is_configuration()
    }

    /// Caused by the shared API quota
    pub fn is_quota(&self) -> bool {
        matches!(
            self,
            CheckError::RateLimited { .. } | CheckError::QuotaExhausted { .. }
        )
    }
}
