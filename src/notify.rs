//! Change notifications for downstream consumers

#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use tracing::{error, info};

use crate::engine::change::{ChangeKind, Severity};
use crate::engine::result::CheckResult;

/// One classified change, ready to be reported
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub dependency_id: String,
    pub url: String,
    pub severity: Severity,
    pub changes: Vec<ChangeKind>,
    pub old_version: Option<String>,
    pub new_version: Option<String>,
}

impl Notification {
    /// Builds a notification for results that should be reported
    pub fn from_result(result: &CheckResult) -> Option<Self> {
        if !result.should_notify() {
            return None;
        }
        let change = result.change()?;

        Some(Self {
            dependency_id: result.dependency.id.clone(),
            url: result.dependency.url.clone(),
            severity: change.severity()?,
            changes: change.changes().collect(),
            old_version: change.old_version.clone(),
            new_version: change.new_version.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to deliver notification for {dependency_id}: {reason}")]
pub struct NotifyError {
    pub dependency_id: String,
    pub reason: String,
}

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Reports changes as structured tracing events
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait::async_trait]
impl ChangeNotifier for LoggingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let changes: Vec<_> = notification.changes.iter().map(|c| c.as_str()).collect();
        info!(
            dependency = %notification.dependency_id,
            url = %notification.url,
            severity = notification.severity.as_str(),
            old_version = notification.old_version.as_deref().unwrap_or("-"),
            new_version = notification.new_version.as_deref().unwrap_or("-"),
            "Dependency changed: {}",
            changes.join(", ")
        );
        Ok(())
    }
}

/// Delivers a notification for every reportable result, most severe first.
///
/// Delivery failures are logged and do not stop the remaining notifications.
/// Returns the number delivered.
pub async fn notify_changes(notifier: &dyn ChangeNotifier, results: &[CheckResult]) -> usize {
    let mut notifications: Vec<_> = results.iter().filter_map(Notification::from_result).collect();
    notifications.sort_by(|a, b| b.severity.cmp(&a.severity));

    let mut delivered = 0;
    for notification in &notifications {
        match notifier.notify(notification).await {
            Ok(()) => delivered += 1,
            Err(e) => error!("{}", e),
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::change::ChangeDetection;
    use crate::engine::error::CheckError;
    use crate::engine::severity::classified;
    use crate::model::{AccessMethod, DependencyRecord, MonitoringSettings, Snapshot};
    use chrono::Utc;

    fn changed_result(id: &str, old: &str, new: &str, ignore_changes: bool) -> CheckResult {
        let record = DependencyRecord::new(id, format!("https://github.com/o/{}", id), AccessMethod::RepositoryApi)
            .with_monitoring(MonitoringSettings {
                ignore_changes,
                ..Default::default()
            });
        let mut change = ChangeDetection::unchanged();
        change.record(ChangeKind::Version);
        change.old_version = Some(old.to_string());
        change.new_version = Some(new.to_string());
        CheckResult::checked(record, Snapshot::new("h", Utc::now()), classified(change))
    }

    #[test]
    fn notification_carries_severity_and_versions() {
        let notification =
            Notification::from_result(&changed_result("a", "v1.2.0", "v2.0.0", false)).unwrap();

        assert_eq!(notification.severity, Severity::Breaking);
        assert_eq!(notification.changes, vec![ChangeKind::Version]);
        assert_eq!(notification.old_version.as_deref(), Some("v1.2.0"));
    }

    #[test]
    fn ignored_and_failed_results_produce_no_notification() {
        assert!(Notification::from_result(&changed_result("a", "1.0.0", "2.0.0", true)).is_none());

        let failed = CheckResult::failed(
            DependencyRecord::new("b", "https://example.com", AccessMethod::HttpContent),
            CheckError::Timeout,
        );
        assert!(Notification::from_result(&failed).is_none());
    }

    #[tokio::test]
    async fn notify_changes_sends_most_severe_first_and_survives_failures() {
        let results = vec![
            changed_result("patch", "1.0.0", "1.0.1", false),
            changed_result("major", "1.0.0", "2.0.0", false),
            changed_result("minor", "1.0.0", "1.1.0", false),
        ];

        let mut notifier = MockChangeNotifier::new();
        let mut sequence = mockall::Sequence::new();
        notifier
            .expect_notify()
            .withf(|n| n.dependency_id == "major")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        notifier
            .expect_notify()
            .withf(|n| n.dependency_id == "minor")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|n| {
                Err(NotifyError {
                    dependency_id: n.dependency_id.clone(),
                    reason: "unavailable".to_string(),
                })
            });
        notifier
            .expect_notify()
            .withf(|n| n.dependency_id == "patch")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));

        assert_eq!(notify_changes(&notifier, &results).await, 2);
    }

    #[tokio::test]
    async fn logging_notifier_always_succeeds() {
        let notification =
            Notification::from_result(&changed_result("a", "1.0.0", "1.1.0", false)).unwrap();

        assert!(LoggingNotifier.notify(&notification).await.is_ok());
    }
}
