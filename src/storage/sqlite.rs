//! SQLite-backed telemetry store.
//!
//! Schema (one append-only table):
//! - ups_data: timestamp, status, bcharge, loadpct, timeleft, linev, battv
//!
//! Timestamps are UTC text `YYYY-MM-DD HH:MM:SS.SSS` so they sort and compare
//! lexically. The database runs in WAL mode: the monitor holds the only writer
//! connection and the read API opens its own reader.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::storage::{Sample, TelemetryStore};
use crate::ups::Snapshot;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS ups_data (
        timestamp DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
        status TEXT NOT NULL,
        bcharge REAL NOT NULL,
        loadpct REAL NOT NULL,
        timeleft REAL NOT NULL,
        linev REAL NOT NULL,
        battv REAL NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_ups_data_timestamp ON ups_data(timestamp);
"#;

const SELECT_COLUMNS: &str = "SELECT timestamp, status, bcharge, loadpct, timeleft, linev, battv FROM ups_data";

pub struct SqliteTelemetryStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteTelemetryStore {
    /// Open (creating if needed) the database and ensure the schema exists.
    /// Safe to call on an existing database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|source| StoreError::Directory { path: dir.to_path_buf(), source })?;
        }

        let open_err = |source| StoreError::Open { path: path.clone(), source };
        let conn = Connection::open(&path).map_err(open_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(open_err)?;
        conn.execute_batch(SCHEMA).map_err(open_err)?;

        info!("Telemetry database ready: {:?}", path);
        Ok(Self { path, conn: Mutex::new(conn) })
    }

    /// Open an existing database for reading only (used by the read API).
    pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| StoreError::Open { path: path.clone(), source };

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(open_err)?;
        conn.busy_timeout(Duration::from_secs(2)).map_err(open_err)?;

        debug!("Opened telemetry reader: {:?}", path);
        Ok(Self { path, conn: Mutex::new(conn) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TelemetryStore for SqliteTelemetryStore {
    async fn append(&self, snapshot: &Snapshot, timestamp: Option<DateTime<Utc>>) -> Result<Sample, StoreError> {
        // An unlinked database file still accepts writes through the open handle.
        if !self.path.exists() {
            return Err(StoreError::StorageLost(format!("{:?} no longer exists", self.path)));
        }

        let conn = self.conn.lock().await;
        let stored: String = match timestamp {
            Some(ts) => conn.query_row(
                "INSERT INTO ups_data (timestamp, status, bcharge, loadpct, timeleft, linev, battv)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) RETURNING timestamp",
                params![
                    format_timestamp(&ts),
                    &snapshot.status,
                    snapshot.battery_charge_pct,
                    snapshot.load_pct,
                    snapshot.time_left_minutes,
                    snapshot.line_voltage,
                    snapshot.battery_voltage
                ],
                |row| row.get(0),
            ),
            None => conn.query_row(
                "INSERT INTO ups_data (status, bcharge, loadpct, timeleft, linev, battv)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING timestamp",
                params![
                    &snapshot.status,
                    snapshot.battery_charge_pct,
                    snapshot.load_pct,
                    snapshot.time_left_minutes,
                    snapshot.line_voltage,
                    snapshot.battery_voltage
                ],
                |row| row.get(0),
            ),
        }
        .map_err(classify_write_error)?;

        Ok(Sample {
            timestamp: parse_timestamp(&stored)?,
            snapshot: snapshot.clone(),
        })
    }

    async fn query(&self, since: chrono::Duration) -> Result<Vec<Sample>, StoreError> {
        let cutoff = format_timestamp(&(Utc::now() - since));
        let conn = self.conn.lock().await;

        let mut stmt = conn
            .prepare(&format!("{} WHERE timestamp > ?1 ORDER BY timestamp DESC, rowid DESC", SELECT_COLUMNS))
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(params![cutoff], read_row)
            .map_err(StoreError::Query)?;

        let mut samples = Vec::new();
        for row in rows {
            let (timestamp, snapshot) = row.map_err(StoreError::Query)?;
            samples.push(Sample { timestamp: parse_timestamp(&timestamp)?, snapshot });
        }
        Ok(samples)
    }

    async fn latest(&self) -> Result<Option<Sample>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                &format!("{} ORDER BY timestamp DESC, rowid DESC LIMIT 1", SELECT_COLUMNS),
                [],
                read_row,
            )
            .optional()
            .map_err(StoreError::Query)?;

        match row {
            Some((timestamp, snapshot)) => Ok(Some(Sample { timestamp: parse_timestamp(&timestamp)?, snapshot })),
            None => Ok(None),
        }
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<(String, Snapshot)> {
    Ok((
        row.get(0)?,
        Snapshot {
            status: row.get(1)?,
            battery_charge_pct: row.get(2)?,
            load_pct: row.get(3)?,
            time_left_minutes: row.get(4)?,
            line_voltage: row.get(5)?,
            battery_voltage: row.get(6)?,
        },
    ))
}

/// Errors that mean the database itself is unusable rather than one write failing.
fn classify_write_error(e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::CannotOpen)
        | Some(ErrorCode::NotADatabase)
        | Some(ErrorCode::DatabaseCorrupt)
        | Some(ErrorCode::ReadOnly) => StoreError::StorageLost(e.to_string()),
        _ => StoreError::Write(e),
    }
}

/// Stored timestamps keep millisecond precision; finer digits are truncated here.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.trunc_subsecs(3).format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| StoreError::Timestamp(raw.to_string()))
}
