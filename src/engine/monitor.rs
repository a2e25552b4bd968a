//! Batch orchestration of dependency checks
//!
//! Each due record runs through fetch, compare and classify on its own. A
//! failure stays in that record's result, and results keep input order.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::engine::change::ChangeDetection;
use crate::engine::checker::Checker;
use crate::engine::checkers::{CheckerRegistry, create_default_checkers};
use crate::engine::error::CheckError;
use crate::engine::rate_limit::{RateLimitHandler, Reservation};
use crate::engine::result::{BatchSummary, CheckResult, SkipReason};
use crate::engine::scheduler::{self, Schedule};
use crate::engine::severity::classified;
use crate::model::{DependencyRecord, Snapshot};

/// Tuning knobs for one monitor pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Maximum number of checks in flight
    pub concurrency: usize,
    /// Global deadline for the whole batch
    pub timeout: Option<Duration>,
    /// Check enabled records even when they are not due yet
    pub force: bool,
    /// How long a refused reservation may wait for the quota reset
    pub max_quota_wait: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

impl MonitorOptions {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            timeout: (config.timeout_ms > 0).then(|| Duration::from_millis(config.timeout_ms)),
            force: false,
            max_quota_wait: Duration::from_millis(config.max_quota_wait_ms),
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

pub struct Monitor {
    checkers: CheckerRegistry,
    rate_limiter: Arc<RateLimitHandler>,
    options: MonitorOptions,
}

impl Monitor {
    pub fn new(
        checkers: CheckerRegistry,
        rate_limiter: Arc<RateLimitHandler>,
        options: MonitorOptions,
    ) -> Self {
        Self {
            checkers,
            rate_limiter,
            options,
        }
    }

    /// Creates a monitor with the default checkers sharing one rate limiter
    pub fn from_config(config: &MonitorConfig) -> Self {
        let rate_limiter = Arc::new(RateLimitHandler::new(config.rate_limit.clone()));
        let checkers = create_default_checkers(config, Arc::clone(&rate_limiter));
        Self::new(checkers, rate_limiter, MonitorOptions::from_config(config))
    }

    pub fn with_options(mut self, options: MonitorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimitHandler> {
        &self.rate_limiter
    }

    pub async fn check_all(&self, records: &[DependencyRecord]) -> Vec<CheckResult> {
        self.check_all_at(records, Utc::now()).await
    }

    /// Runs one pass over `records`, scheduling against `now`.
    ///
    /// Returns exactly one result per record, in input order. Individual
    /// failures, including the global deadline, are reported per record.
    pub async fn check_all_at(
        &self,
        records: &[DependencyRecord],
        now: DateTime<Utc>,
    ) -> Vec<CheckResult> {
        let deadline = self.options.timeout.map(|timeout| Instant::now() + timeout);

        let mut slots: Vec<Option<CheckResult>> = Vec::with_capacity(records.len());
        slots.resize_with(records.len(), || None);

        let mut completed = stream::iter(records.iter().enumerate())
            .map(|(index, record)| async move {
                (index, self.run_scheduled(record, now, deadline).await)
            })
            .buffer_unordered(self.options.concurrency.max(1));

        while let Some((index, result)) = completed.next().await {
            slots[index] = Some(result);
        }

        let results: Vec<CheckResult> = slots.into_iter().flatten().collect();

        let summary = BatchSummary::from_results(&results);
        info!(
            "Checked {} of {} dependencies: {} changed, {} skipped, {} errors, {} rate limit warnings",
            summary.checked,
            summary.total,
            summary.changed,
            summary.skipped,
            summary.errors,
            summary.rate_limit_warnings
        );

        results
    }

    async fn run_scheduled(
        &self,
        record: &DependencyRecord,
        now: DateTime<Utc>,
        deadline: Option<Instant>,
    ) -> CheckResult {
        match scheduler::decide(record, now) {
            Schedule::Disabled => {
                debug!("Skipping {}: monitoring disabled", record.id);
                return CheckResult::skipped(record.clone(), SkipReason::Disabled);
            }
            Schedule::NotDue { next_check } if !self.options.force => {
                debug!("Skipping {}: next check at {}", record.id, next_check);
                return CheckResult::skipped(record.clone(), SkipReason::NotDue);
            }
            _ => {}
        }

        let Some(deadline) = deadline else {
            return self.check_one(record).await;
        };

        if Instant::now() >= deadline {
            warn!("Deadline passed before {} could start", record.id);
            return CheckResult::failed(record.clone(), CheckError::Timeout);
        }

        match timeout_at(deadline, self.check_one(record)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Check of {} aborted at the batch deadline", record.id);
                CheckResult::failed(record.clone(), CheckError::Timeout)
            }
        }
    }

    /// Fetch, compare and classify one record
    pub async fn check_one(&self, record: &DependencyRecord) -> CheckResult {
        let Some(checker) = self.checkers.get(record.access_method) else {
            warn!(
                "No checker for {} ({})",
                record.id,
                record.access_method.as_str()
            );
            return CheckResult::failed(
                record.clone(),
                CheckError::UnsupportedAccessMethod(record.access_method.as_str()),
            );
        };

        let reservation = match self.reserve(checker.quota_cost()).await {
            Ok(reservation) => reservation,
            Err(e) => {
                warn!("Deferring {}: {}", record.id, e);
                return CheckResult::failed(record.clone(), e);
            }
        };
        let quota_warning = reservation.is_some_and(|r| r.warning);

        let result = match checker.fetch(record).await {
            Ok(snapshot) => {
                let change = detect_change(checker.as_ref(), record, &snapshot);
                if change.has_changed() {
                    info!(
                        "Change detected for {} ({}): {:?}",
                        record.id,
                        change.severity().map(|s| s.as_str()).unwrap_or("-"),
                        change.changes().map(|c| c.as_str()).collect::<Vec<_>>()
                    );
                } else {
                    debug!("No change for {}", record.id);
                }
                CheckResult::checked(record.clone(), snapshot, change)
            }
            Err(e) => {
                warn!("Check failed for {}: {}", record.id, e);
                CheckResult::failed(record.clone(), e)
            }
        };

        result.with_rate_limit_warning(quota_warning)
    }

    /// Claims quota for checkers that consume it; None when free
    async fn reserve(&self, units: u32) -> Result<Option<Reservation>, CheckError> {
        if units == 0 {
            return Ok(None);
        }

        match self.rate_limiter.reserve(units) {
            Ok(reservation) => Ok(Some(reservation)),
            Err(refusal) if self.options.max_quota_wait.is_zero() => Err(refusal.into()),
            Err(refusal) => {
                if !self.rate_limiter.wait_if_needed(self.options.max_quota_wait).await {
                    return Err(refusal.into());
                }
                Ok(Some(self.rate_limiter.reserve(units)?))
            }
        }
    }
}

/// Compares the fresh snapshot with the record's persisted state.
///
/// A record without a baseline only establishes one.
fn detect_change(
    checker: &dyn Checker,
    record: &DependencyRecord,
    snapshot: &Snapshot,
) -> ChangeDetection {
    if !record.has_baseline() {
        info!("Baseline established for {}", record.id);
        return ChangeDetection::unchanged();
    }

    let baseline = record.baseline_snapshot(snapshot);
    classified(checker.compare(&baseline, snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::engine::change::{ChangeKind, Severity};
    use crate::engine::checker::MockChecker;
    use crate::engine::comparator::compare_snapshots;
    use crate::engine::rate_limit::Quota;
    use crate::model::{AccessMethod, MonitoringSettings};
    use chrono::TimeDelta;

    fn mock_checker(
        method: AccessMethod,
        quota_cost: u32,
        fetch: impl Fn(&DependencyRecord) -> Result<Snapshot, CheckError> + Send + Sync + 'static,
    ) -> MockChecker {
        let mut checker = MockChecker::new();
        checker.expect_access_method().return_const(method);
        checker.expect_quota_cost().return_const(quota_cost);
        checker.expect_fetch().returning(move |record| fetch(record));
        checker
            .expect_compare()
            .returning(|previous, current| compare_snapshots(previous, current));
        checker
    }

    fn monitor(checker: MockChecker, rate_limiter: RateLimitHandler) -> Monitor {
        Monitor::new(
            CheckerRegistry::new().with(Arc::new(checker)),
            Arc::new(rate_limiter),
            MonitorOptions {
                concurrency: 4,
                timeout: None,
                force: false,
                max_quota_wait: Duration::ZERO,
            },
        )
    }

    fn record(id: &str) -> DependencyRecord {
        DependencyRecord::new(id, format!("https://example.com/{}", id), AccessMethod::HttpContent)
            .with_state_hash("old")
    }

    #[tokio::test]
    async fn failure_is_isolated_to_its_record() {
        let checker = mock_checker(AccessMethod::HttpContent, 0, |record| {
            if record.id == "b" {
                Err(CheckError::HttpStatus {
                    status: 500,
                    url: record.url.clone(),
                })
            } else {
                Ok(Snapshot::new("old", Utc::now()))
            }
        });
        let monitor = monitor(checker, RateLimitHandler::new(RateLimitConfig::default()));
        let records = vec![record("a"), record("b"), record("c")];

        let results = monitor.check_all(&records).await;

        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(|r| r.dependency.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(results.iter().filter(|r| r.error().is_some()).count(), 1);
        assert!(results[1].error().is_some());
        assert!(results[0].snapshot().is_some());
        assert!(results[2].snapshot().is_some());
    }

    #[tokio::test]
    async fn disabled_record_is_skipped_without_fetch() {
        let mut checker = MockChecker::new();
        checker
            .expect_access_method()
            .return_const(AccessMethod::HttpContent);
        checker.expect_fetch().never();
        let monitor = monitor(checker, RateLimitHandler::new(RateLimitConfig::default()));
        let disabled = record("a").with_monitoring(MonitoringSettings {
            enabled: false,
            ..Default::default()
        });

        let results = monitor.check_all(&[disabled]).await;

        assert_eq!(results[0].skip_reason(), Some(SkipReason::Disabled));
        assert_eq!(BatchSummary::from_results(&results).checked, 0);
    }

    #[tokio::test]
    async fn not_due_record_is_skipped_unless_forced() {
        let now = Utc::now();
        let fresh = record("a").with_last_checked(now - TimeDelta::hours(1));
        let checker = mock_checker(AccessMethod::HttpContent, 0, |_| {
            Ok(Snapshot::new("old", Utc::now()))
        });
        let monitor = monitor(checker, RateLimitHandler::new(RateLimitConfig::default()));

        let results = monitor.check_all_at(std::slice::from_ref(&fresh), now).await;
        assert_eq!(results[0].skip_reason(), Some(SkipReason::NotDue));

        let options = MonitorOptions {
            force: true,
            ..monitor.options.clone()
        };
        let monitor = monitor.with_options(options);
        let results = monitor.check_all_at(&[fresh], now).await;
        assert!(results[0].snapshot().is_some());
    }

    #[tokio::test]
    async fn first_check_establishes_baseline_without_change() {
        let checker = mock_checker(AccessMethod::HttpContent, 0, |_| {
            Ok(Snapshot::new("first", Utc::now()))
        });
        let monitor = monitor(checker, RateLimitHandler::new(RateLimitConfig::default()));
        let fresh = DependencyRecord::new("a", "https://example.com", AccessMethod::HttpContent);

        let results = monitor.check_all(&[fresh]).await;

        assert!(!results[0].has_changed());
        assert_eq!(
            results[0].update().map(|u| u.current_state_hash),
            Some("first".to_string())
        );
    }

    #[tokio::test]
    async fn version_bump_is_classified() {
        let checker = mock_checker(AccessMethod::HttpContent, 0, |_| {
            Ok(Snapshot::new("new", Utc::now()).with_version(Some("v2.0.0".to_string())))
        });
        let monitor = monitor(checker, RateLimitHandler::new(RateLimitConfig::default()));

        let results = monitor.check_all(&[record("a").with_version("v1.2.0")]).await;

        let change = results[0].change().unwrap();
        assert!(change.contains(ChangeKind::Version));
        assert_eq!(change.severity(), Some(Severity::Breaking));
    }

    #[tokio::test]
    async fn missing_checker_is_a_configuration_error() {
        let checker = mock_checker(AccessMethod::HttpContent, 0, |_| {
            Ok(Snapshot::new("old", Utc::now()))
        });
        let monitor = monitor(checker, RateLimitHandler::new(RateLimitConfig::default()));
        let record = DependencyRecord::new("a", "https://github.com/a/b", AccessMethod::RepositoryApi);

        let results = monitor.check_all(&[record]).await;

        assert!(results[0].error().is_some_and(CheckError::is_configuration));
    }

    #[tokio::test]
    async fn quota_refusal_fails_only_quota_consuming_checks() {
        let repository = mock_checker(AccessMethod::RepositoryApi, 1, |_| {
            Ok(Snapshot::new("old", Utc::now()))
        });
        let content = mock_checker(AccessMethod::HttpContent, 0, |_| {
            Ok(Snapshot::new("old", Utc::now()))
        });
        let rate_limiter = RateLimitHandler::with_quota(
            RateLimitConfig {
                warning_threshold: 100,
                min_remaining: 10,
            },
            Quota {
                limit: 5000,
                remaining: 5,
                reset_at: Utc::now() + TimeDelta::minutes(30),
            },
        );
        let monitor = Monitor::new(
            CheckerRegistry::new()
                .with(Arc::new(repository))
                .with(Arc::new(content)),
            Arc::new(rate_limiter),
            MonitorOptions::default(),
        );
        let records = vec![
            DependencyRecord::new("repo", "https://github.com/a/b", AccessMethod::RepositoryApi)
                .with_state_hash("old"),
            record("page"),
        ];

        let results = monitor.check_all(&records).await;

        assert!(matches!(
            results[0].error(),
            Some(CheckError::QuotaExhausted { remaining: 5, .. })
        ));
        assert!(results[1].snapshot().is_some());
        assert_eq!(BatchSummary::from_results(&results).rate_limit_warnings, 1);
    }

    #[test]
    fn options_from_config_carry_deadline_and_quota_wait() {
        let config = MonitorConfig {
            timeout_ms: 0,
            max_quota_wait_ms: 1500,
            concurrency: 0,
            ..Default::default()
        };

        let options = MonitorOptions::from_config(&config);

        assert_eq!(options.timeout, None);
        assert_eq!(options.max_quota_wait, Duration::from_millis(1500));
        assert_eq!(options.concurrency, 1);
    }

    fn exhausted_quota(reset_in: TimeDelta) -> RateLimitHandler {
        RateLimitHandler::with_quota(
            RateLimitConfig {
                warning_threshold: 100,
                min_remaining: 10,
            },
            Quota {
                limit: 5000,
                remaining: 5,
                reset_at: Utc::now() + reset_in,
            },
        )
    }

    fn waiting_monitor(rate_limiter: RateLimitHandler, max_quota_wait: Duration) -> Monitor {
        let repository = mock_checker(AccessMethod::RepositoryApi, 1, |_| {
            Ok(Snapshot::new("old", Utc::now()))
        });
        Monitor::new(
            CheckerRegistry::new().with(Arc::new(repository)),
            Arc::new(rate_limiter),
            MonitorOptions {
                concurrency: 1,
                timeout: None,
                force: false,
                max_quota_wait,
            },
        )
    }

    fn repository_record() -> DependencyRecord {
        DependencyRecord::new("repo", "https://github.com/a/b", AccessMethod::RepositoryApi)
            .with_state_hash("old")
    }

    #[tokio::test]
    async fn refused_check_waits_for_a_reset_within_the_bound() {
        let monitor = waiting_monitor(
            exhausted_quota(TimeDelta::milliseconds(200)),
            Duration::from_secs(5),
        );

        let results = monitor.check_all(&[repository_record()]).await;

        assert!(results[0].snapshot().is_some());
        assert_eq!(
            monitor.rate_limiter().quota().map(|q| q.remaining),
            Some(4999)
        );
    }

    #[tokio::test]
    async fn refused_check_fails_when_reset_is_beyond_the_bound() {
        let monitor = waiting_monitor(
            exhausted_quota(TimeDelta::minutes(30)),
            Duration::from_millis(50),
        );

        let results = monitor.check_all(&[repository_record()]).await;

        assert!(matches!(
            results[0].error(),
            Some(CheckError::QuotaExhausted { remaining: 5, .. })
        ));
    }

    #[tokio::test]
    async fn checks_past_the_deadline_time_out() {
        let mut slow = MockChecker::new();
        slow.expect_access_method()
            .return_const(AccessMethod::HttpContent);
        slow.expect_quota_cost().return_const(0u32);
        slow.expect_fetch().returning(|_| Err(CheckError::Timeout));
        let monitor = Monitor::new(
            CheckerRegistry::new().with(Arc::new(slow)),
            Arc::new(RateLimitHandler::new(RateLimitConfig::default())),
            MonitorOptions {
                concurrency: 2,
                timeout: Some(Duration::ZERO),
                force: false,
                max_quota_wait: Duration::ZERO,
            },
        );

        let results = monitor.check_all(&[record("a"), record("b")]).await;

        assert_eq!(results.len(), 2);
        assert!(
            results
                .iter()
                .all(|r| matches!(r.error(), Some(CheckError::Timeout)))
        );
    }
}
