//! Advisory budget for the quota shared by every check in a batch
//!
//! The handler never performs network calls. Checkers report what the API
//! told them through [`RateLimitHandler::observe`], and the monitor reserves
//! budget before each quota-consuming fetch.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::RateLimitConfig;
use crate::engine::error::CheckError;

/// Assumed length of a quota window until the API reports the real reset
const QUOTA_WINDOW_SECS: i64 = 3600;

/// Last observed quota of the external API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Budget status derived from the last known quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    /// No quota observed yet
    Unknown,
    Healthy {
        remaining: u32,
    },
    /// At or below the warning threshold; checks still proceed
    Warning {
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    /// At or below the minimum floor with the reset still ahead
    Exhausted {
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
}

/// Granted claim against the remaining quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub units: u32,
    /// Remaining quota after this reservation, if known
    pub remaining: Option<u32>,
    /// Quota has dropped to the warning threshold
    pub warning: bool,
}

/// Reservation denied until the quota resets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRefusal {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl From<QuotaRefusal> for CheckError {
    fn from(refusal: QuotaRefusal) -> Self {
        CheckError::QuotaExhausted {
            remaining: refusal.remaining,
            reset_at: refusal.reset_at,
        }
    }
}

pub struct RateLimitHandler {
    config: RateLimitConfig,
    quota: Mutex<Option<Quota>>,
}

impl RateLimitHandler {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            quota: Mutex::new(None),
        }
    }

    /// Creates a handler seeded with a known quota
    pub fn with_quota(config: RateLimitConfig, quota: Quota) -> Self {
        Self {
            config,
            quota: Mutex::new(Some(quota)),
        }
    }

    /// The counter stays usable even if a holder panicked
    fn lock_quota(&self) -> MutexGuard<'_, Option<Quota>> {
        self.quota.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the last known quota, including local reservations
    pub fn quota(&self) -> Option<Quota> {
        *self.lock_quota()
    }

    /// Records a quota observation reported by the API.
    ///
    /// Within the same reset window the lower remaining count wins, so a
    /// stale response cannot hand back budget already reserved locally.
    pub fn observe(&self, observed: Quota) {
        let mut quota = self.lock_quota();
        let merged = match *quota {
            Some(current) if current.reset_at == observed.reset_at => Quota {
                remaining: current.remaining.min(observed.remaining),
                ..observed
            },
            _ => observed,
        };
        debug!(
            "Quota observed: {}/{} remaining, resets at {}",
            merged.remaining, merged.limit, merged.reset_at
        );
        *quota = Some(merged);
    }

    pub fn check_budget(&self) -> BudgetStatus {
        self.check_budget_at(Utc::now())
    }

    pub fn check_budget_at(&self, now: DateTime<Utc>) -> BudgetStatus {
        match *self.lock_quota() {
            None => BudgetStatus::Unknown,
            Some(quota) => self.status_of(&quota, now),
        }
    }

    fn status_of(&self, quota: &Quota, now: DateTime<Utc>) -> BudgetStatus {
        if quota.reset_at <= now {
            return BudgetStatus::Healthy {
                remaining: quota.limit,
            };
        }

        if quota.remaining <= self.config.min_remaining {
            BudgetStatus::Exhausted {
                remaining: quota.remaining,
                reset_at: quota.reset_at,
            }
        } else if quota.remaining <= self.config.warning_threshold {
            BudgetStatus::Warning {
                remaining: quota.remaining,
                reset_at: quota.reset_at,
            }
        } else {
            BudgetStatus::Healthy {
                remaining: quota.remaining,
            }
        }
    }

    pub fn reserve(&self, units: u32) -> Result<Reservation, QuotaRefusal> {
        self.reserve_at(units, Utc::now())
    }

    /// Claims `units` of quota; check and decrement happen under one lock
    pub fn reserve_at(&self, units: u32, now: DateTime<Utc>) -> Result<Reservation, QuotaRefusal> {
        let mut guard = self.lock_quota();

        let Some(quota) = guard.as_mut() else {
            return Ok(Reservation {
                units,
                remaining: None,
                warning: false,
            });
        };

        if quota.reset_at <= now {
            quota.remaining = quota.limit;
            quota.reset_at = now + TimeDelta::seconds(QUOTA_WINDOW_SECS);
            debug!(
                "Quota window rolled over, assuming {} until {}",
                quota.limit, quota.reset_at
            );
        }

        if quota.remaining <= self.config.min_remaining {
            warn!(
                "Quota exhausted ({} remaining, floor {}), refusing until {}",
                quota.remaining, self.config.min_remaining, quota.reset_at
            );
            return Err(QuotaRefusal {
                remaining: quota.remaining,
                reset_at: quota.reset_at,
            });
        }

        quota.remaining = quota.remaining.saturating_sub(units);
        let warning = quota.remaining <= self.config.warning_threshold;
        if warning {
            warn!(
                "Quota running low: {} of {} remaining",
                quota.remaining, quota.limit
            );
        }

        Ok(Reservation {
            units,
            remaining: Some(quota.remaining),
            warning,
        })
    }

    /// Sleeps until the quota resets when exhausted and the reset is within
    /// `max_wait`.
    ///
    /// Returns false when the budget is exhausted for longer than `max_wait`.
    pub async fn wait_if_needed(&self, max_wait: Duration) -> bool {
        let now = Utc::now();
        let BudgetStatus::Exhausted { reset_at, .. } = self.check_budget_at(now) else {
            return true;
        };

        let Ok(wait) = (reset_at - now).to_std() else {
            return true;
        };

        if wait > max_wait {
            debug!("Quota resets in {:?}, longer than {:?}", wait, max_wait);
            return false;
        }

        info!("Waiting {:?} for quota reset", wait);
        sleep(wait).await;
        true
    }
}
