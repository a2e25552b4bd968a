//! Manifest store holding the tracked dependency records

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::result::CheckResult;
use crate::model::{DependencyRecord, Metadata, MonitoringSettings, RecordUpdate};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Invalid record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },
}

/// Owner of the dependency records the monitor works on
#[cfg_attr(test, automock)]
pub trait ManifestStore: Send + Sync {
    /// All records in insertion order
    fn load_records(&self) -> Result<Vec<DependencyRecord>, StoreError>;

    /// Insert a record, or replace the one with the same id
    fn upsert_record(&self, record: &DependencyRecord) -> Result<(), StoreError>;

    /// Writes back check results; returns how many records were updated
    fn apply_updates(&self, updates: &[RecordUpdate]) -> Result<usize, StoreError>;

    fn get_record(&self, id: &str) -> Result<Option<DependencyRecord>, StoreError>;
}

/// Writes the state of every successfully checked record back to the store.
///
/// Failed and skipped results leave their records untouched. Returns the
/// number of records updated.
pub fn persist_results(
    store: &dyn ManifestStore,
    results: &[CheckResult],
) -> Result<usize, StoreError> {
    let updates: Vec<RecordUpdate> = results.iter().filter_map(CheckResult::update).collect();
    if updates.is_empty() {
        debug!("No successful checks to write back");
        return Ok(0);
    }

    store.apply_updates(&updates)
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, url, access_method, name, description, current_state_hash,
           current_version, state_metadata, last_checked, enabled,
           check_frequency, ignore_changes
    FROM dependencies
"#;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        info!("Opening manifest database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        Ok(store)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        debug!("Creating database schema");

        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS dependencies (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                access_method TEXT NOT NULL,
                name TEXT,
                description TEXT,
                current_state_hash TEXT NOT NULL DEFAULT '',
                current_version TEXT,
                state_metadata TEXT,
                last_checked INTEGER,
                enabled INTEGER NOT NULL DEFAULT 1,
                check_frequency TEXT NOT NULL DEFAULT 'daily',
                ignore_changes INTEGER NOT NULL DEFAULT 0
            )
            "#,
            [],
        )?;

        debug!("Database schema created successfully");
        Ok(())
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
        Ok(RecordRow {
            id: row.get(0)?,
            url: row.get(1)?,
            access_method: row.get(2)?,
            name: row.get(3)?,
            description: row.get(4)?,
            current_state_hash: row.get(5)?,
            current_version: row.get(6)?,
            state_metadata: row.get(7)?,
            last_checked: row.get(8)?,
            enabled: row.get(9)?,
            check_frequency: row.get(10)?,
            ignore_changes: row.get(11)?,
        })
    }
}

/// Raw column values of one `dependencies` row
struct RecordRow {
    id: String,
    url: String,
    access_method: String,
    name: Option<String>,
    description: Option<String>,
    current_state_hash: String,
    current_version: Option<String>,
    state_metadata: Option<String>,
    last_checked: Option<i64>,
    enabled: bool,
    check_frequency: String,
    ignore_changes: bool,
}

impl TryFrom<RecordRow> for DependencyRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let invalid = |reason: String| StoreError::InvalidRecord {
            id: row.id.clone(),
            reason,
        };

        let access_method = row
            .access_method
            .parse()
            .map_err(|_| invalid(format!("unknown access method {}", row.access_method)))?;
        let check_frequency = row
            .check_frequency
            .parse()
            .map_err(|_| invalid(format!("unknown check frequency {}", row.check_frequency)))?;
        let last_checked = row
            .last_checked
            .map(|ms| {
                DateTime::<Utc>::from_timestamp_millis(ms)
                    .ok_or_else(|| invalid(format!("timestamp out of range: {}", ms)))
            })
            .transpose()?;
        let state_metadata = row
            .state_metadata
            .as_deref()
            .map(serde_json::from_str::<Metadata>)
            .transpose()?;

        Ok(DependencyRecord {
            id: row.id,
            url: row.url,
            access_method,
            name: row.name,
            description: row.description,
            current_state_hash: row.current_state_hash,
            current_version: row.current_version,
            state_metadata,
            last_checked,
            monitoring: MonitoringSettings {
                enabled: row.enabled,
                check_frequency,
                ignore_changes: row.ignore_changes,
            },
        })
    }
}

impl ManifestStore for SqliteStore {
    fn load_records(&self) -> Result<Vec<DependencyRecord>, StoreError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY rowid", SELECT_COLUMNS))?;

        let rows = stmt
            .query_map([], Self::read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(DependencyRecord::try_from).collect()
    }

    fn get_record(&self, id: &str) -> Result<Option<DependencyRecord>, StoreError> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                [id],
                Self::read_row,
            )
            .optional()?;

        row.map(DependencyRecord::try_from).transpose()
    }

    fn upsert_record(&self, record: &DependencyRecord) -> Result<(), StoreError> {
        let state_metadata = record
            .state_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO dependencies (
                id, url, access_method, name, description, current_state_hash,
                current_version, state_metadata, last_checked, enabled,
                check_frequency, ignore_changes
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                access_method = excluded.access_method,
                name = excluded.name,
                description = excluded.description,
                current_state_hash = excluded.current_state_hash,
                current_version = excluded.current_version,
                state_metadata = excluded.state_metadata,
                last_checked = excluded.last_checked,
                enabled = excluded.enabled,
                check_frequency = excluded.check_frequency,
                ignore_changes = excluded.ignore_changes
            "#,
            rusqlite::params![
                record.id,
                record.url,
                record.access_method.as_str(),
                record.name,
                record.description,
                record.current_state_hash,
                record.current_version,
                state_metadata,
                record.last_checked.map(|t| t.timestamp_millis()),
                record.monitoring.enabled,
                record.monitoring.check_frequency.as_str(),
                record.monitoring.ignore_changes,
            ],
        )?;

        debug!("Saved record {}", record.id);
        Ok(())
    }

    fn apply_updates(&self, updates: &[RecordUpdate]) -> Result<usize, StoreError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let mut updated = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                UPDATE dependencies
                SET current_state_hash = ?2, current_version = ?3,
                    state_metadata = ?4, last_checked = ?5
                WHERE id = ?1
                "#,
            )?;

            for update in updates {
                let changed = stmt.execute((
                    &update.id,
                    &update.current_state_hash,
                    &update.current_version,
                    serde_json::to_string(&update.state_metadata)?,
                    update.last_checked.timestamp_millis(),
                ))?;
                if changed == 0 {
                    warn!("Record {} no longer exists, update dropped", update.id);
                }
                updated += changed;
            }
        }

        tx.commit()?;
        debug!("Applied {} of {} updates", updated, updates.len());
        Ok(updated)
    }
}
