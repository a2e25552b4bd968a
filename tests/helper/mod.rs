//! Shared test utilities for engine integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use depwatch::config::RateLimitConfig;
use depwatch::engine::checker::Checker;
use depwatch::engine::checkers::CheckerRegistry;
use depwatch::engine::error::CheckError;
use depwatch::engine::monitor::{Monitor, MonitorOptions};
use depwatch::engine::rate_limit::RateLimitHandler;
use depwatch::model::{AccessMethod, DependencyRecord, Snapshot};
use depwatch::store::SqliteStore;

/// What a scripted fetch does for one record id
#[derive(Clone)]
pub enum Script {
    Snapshot(Snapshot),
    Status(u16),
    Slow(Duration, Snapshot),
}

/// Checker that replays scripted responses and counts fetches
pub struct ScriptedChecker {
    access_method: AccessMethod,
    quota_cost: u32,
    scripts: HashMap<String, Script>,
    fetches: AtomicUsize,
}

impl ScriptedChecker {
    pub fn new(access_method: AccessMethod) -> Self {
        Self {
            access_method,
            quota_cost: 0,
            scripts: HashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_quota_cost(mut self, quota_cost: u32) -> Self {
        self.quota_cost = quota_cost;
        self
    }

    pub fn with(mut self, id: &str, script: Script) -> Self {
        self.scripts.insert(id.to_string(), script);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    fn access_method(&self) -> AccessMethod {
        self.access_method
    }

    fn quota_cost(&self) -> u32 {
        self.quota_cost
    }

    async fn fetch(&self, record: &DependencyRecord) -> Result<Snapshot, CheckError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        match self.scripts.get(&record.id) {
            Some(Script::Snapshot(snapshot)) => Ok(snapshot.clone()),
            Some(Script::Slow(delay, snapshot)) => {
                tokio::time::sleep(*delay).await;
                Ok(snapshot.clone())
            }
            Some(Script::Status(status)) => Err(CheckError::HttpStatus {
                status: *status,
                url: record.url.clone(),
            }),
            None => Err(CheckError::NotFound(record.url.clone())),
        }
    }
}

pub fn snapshot(hash: &str) -> Snapshot {
    Snapshot::new(hash, Utc::now())
}

pub fn versioned_snapshot(hash: &str, version: &str) -> Snapshot {
    snapshot(hash).with_version(Some(version.to_string()))
}

/// Record with an established baseline
pub fn record(id: &str, access_method: AccessMethod) -> DependencyRecord {
    DependencyRecord::new(id, format!("https://example.com/{}", id), access_method)
        .with_state_hash(format!("{}-baseline", id))
}

pub fn options() -> MonitorOptions {
    MonitorOptions {
        concurrency: 4,
        timeout: None,
        force: false,
        max_quota_wait: Duration::ZERO,
    }
}

pub fn create_monitor(checkers: Vec<Arc<dyn Checker>>, options: MonitorOptions) -> Monitor {
    create_monitor_with_limiter(
        checkers,
        RateLimitHandler::new(RateLimitConfig::default()),
        options,
    )
}

pub fn create_monitor_with_limiter(
    checkers: Vec<Arc<dyn Checker>>,
    rate_limiter: RateLimitHandler,
    options: MonitorOptions,
) -> Monitor {
    let registry = checkers
        .into_iter()
        .fold(CheckerRegistry::new(), |registry, checker| registry.with(checker));
    Monitor::new(registry, Arc::new(rate_limiter), options)
}

pub fn create_test_store() -> (TempDir, SqliteStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = SqliteStore::new(&temp_dir.path().join("test.db")).unwrap();
    (temp_dir, store)
}
