//! Sync History - SQLite log of completed operations
//!
//! Every push, pull or sync run by the CLI or the auto-sync loop is appended
//! to a `sync_runs` table so `vaultsync status` can show what happened last.
//!
//! The database is stored in XDG_DATA_HOME/vaultsync/history.db

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::HistoryConfig;
use crate::result::{SyncOperation, SyncResult};

/// One recorded operation
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRun {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub operation: SyncOperation,
    pub success: bool,
    pub message: String,
    pub files_uploaded: u64,
    pub files_downloaded: u64,
    pub files_deleted: u64,
    pub failure: Option<String>,
}

/// History database manager
pub struct SyncHistory {
    conn: Connection,
}

impl SyncHistory {
    /// Open the database named by the configuration, or the default one
    pub fn open(config: &HistoryConfig) -> Result<Self> {
        let path = match &config.path {
            Some(path) => PathBuf::from(path),
            None => Self::default_path(),
        };
        Self::open_at(path)
    }

    /// Open or create the database at a specific path
    pub fn open_at(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create history directory")?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open history database at {}", path.display()))?;

        let db = Self { conn };
        db.initialize()?;

        info!("History database opened at {}", path.display());
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Default database location
    pub fn default_path() -> PathBuf {
        let data_dir = if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
            PathBuf::from(data_home)
        } else if let Some(data_dir) = dirs::data_dir() {
            data_dir
        } else {
            PathBuf::from("/tmp")
        };

        data_dir.join("vaultsync").join("history.db")
    }

    fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS sync_runs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    operation TEXT NOT NULL,
                    success INTEGER NOT NULL,
                    message TEXT NOT NULL,
                    files_uploaded INTEGER NOT NULL DEFAULT 0,
                    files_downloaded INTEGER NOT NULL DEFAULT 0,
                    files_deleted INTEGER NOT NULL DEFAULT 0,
                    failure TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_runs_timestamp ON sync_runs(timestamp);
                "#,
            )
            .context("Failed to initialize history schema")?;

        debug!("History schema initialized");
        Ok(())
    }

    /// Append the outcome of an operation
    pub fn record(&self, operation: SyncOperation, result: &SyncResult) -> Result<i64> {
        self.conn
            .execute(
                r#"
                INSERT INTO sync_runs (timestamp, operation, success, message,
                                       files_uploaded, files_downloaded, files_deleted, failure)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    Utc::now().to_rfc3339(),
                    operation.as_str(),
                    result.success,
                    result.message,
                    result.files_uploaded as i64,
                    result.files_downloaded as i64,
                    result.files_deleted as i64,
                    result.failure.map(|kind| kind.as_str()),
                ],
            )
            .context("Failed to record sync run")?;

        let id = self.conn.last_insert_rowid();
        debug!("Recorded {} run #{}", operation, id);
        Ok(id)
    }

    /// Most recent runs, newest first
    pub fn recent(&self, limit: u32) -> Result<Vec<SyncRun>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, operation, success, message,
                   files_uploaded, files_downloaded, files_deleted, failure
            FROM sync_runs
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let runs = stmt
            .query_map(params![limit], run_from_row)
            .context("Failed to query sync runs")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect sync runs")?;

        Ok(runs)
    }

    /// The latest run, if any
    pub fn last(&self) -> Result<Option<SyncRun>> {
        self.conn
            .query_row(
                r#"
                SELECT id, timestamp, operation, success, message,
                       files_uploaded, files_downloaded, files_deleted, failure
                FROM sync_runs
                ORDER BY id DESC
                LIMIT 1
                "#,
                [],
                run_from_row,
            )
            .optional()
            .context("Failed to query last sync run")
    }

    /// Delete runs older than the given number of days
    pub fn cleanup_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(days as i64);
        let count = self
            .conn
            .execute(
                "DELETE FROM sync_runs WHERE timestamp < ?1",
                params![cutoff.to_rfc3339()],
            )
            .context("Failed to clean up sync runs")?;
        Ok(count as u64)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<SyncRun> {
    Ok(SyncRun {
        id: row.get(0)?,
        timestamp: row
            .get::<_, String>(1)
            .ok()
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
        operation: SyncOperation::parse(&row.get::<_, String>(2)?).unwrap_or(SyncOperation::Sync),
        success: row.get(3)?,
        message: row.get(4)?,
        files_uploaded: row.get::<_, i64>(5)? as u64,
        files_downloaded: row.get::<_, i64>(6)? as u64,
        files_deleted: row.get::<_, i64>(7)? as u64,
        failure: row.get(8)?,
    })
}
