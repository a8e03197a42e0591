//! SQLite storage for raw samples and daily summaries

use chrono::{Local, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// One measurement of one process's traffic over a single sampling interval.
/// Byte counts are interval deltas, never cumulative counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub pid: u32,
    pub process_name: String,
    pub app_name: Option<String>,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

/// One row of a daily per-application rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub app_name: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub total_bytes: u64,
}

/// Storage contract consumed by the persister and the summary manager.
pub trait SampleStore: Send + Sync {
    fn insert_samples_batch(&self, samples: &[Sample]) -> Result<(), StorageError>;

    /// Samples with `start_ts <= timestamp <= end_ts`, ordered by timestamp ascending.
    fn get_samples_for_range(&self, start_ts: i64, end_ts: i64)
        -> Result<Vec<Sample>, StorageError>;

    /// Recompute the rollup for `date`: delete-then-insert, idempotent.
    fn aggregate_daily(&self, date: NaiveDate) -> Result<(), StorageError>;

    /// Rollup rows for `date`, ordered by `total_bytes` descending.
    fn get_daily_summary(&self, date: NaiveDate) -> Result<Vec<SummaryRow>, StorageError>;

    /// Delete raw samples older than the retention window; returns the deleted count.
    /// Summaries are the permanent historical record and are never purged.
    fn cleanup_old_data(&self, retention_days: u32) -> Result<usize, StorageError>;

    /// Dates that have rollup rows, descending.
    fn get_available_dates(&self) -> Result<Vec<NaiveDate>, StorageError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_default() -> Result<Self, StorageError> {
        let path = directories::ProjectDirs::from("", "", "netmeter")
            .map(|dirs| dirs.data_dir().join("usage.db"))
            .unwrap_or_else(|| std::path::PathBuf::from("usage.db"));
        Self::open(&path)
    }

    pub fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("../schema.sql"))?;
        Ok(())
    }

    /// Epoch timestamp of local midnight starting `date`. Falls back to the
    /// naive UTC interpretation when local midnight does not exist (DST gap).
    fn day_start_ts(date: NaiveDate) -> i64 {
        let midnight = date.and_time(NaiveTime::MIN);
        Local
            .from_local_datetime(&midnight)
            .earliest()
            .map(|dt| dt.timestamp())
            .unwrap_or_else(|| midnight.and_utc().timestamp())
    }

    fn map_sample(row: &rusqlite::Row) -> rusqlite::Result<Sample> {
        Ok(Sample {
            timestamp: row.get(0)?,
            pid: row.get(1)?,
            process_name: row.get(2)?,
            app_name: row.get(3)?,
            bytes_sent: row.get::<_, i64>(4)? as u64,
            bytes_recv: row.get::<_, i64>(5)? as u64,
        })
    }
}

impl SampleStore for Database {
    fn insert_samples_batch(&self, samples: &[Sample]) -> Result<(), StorageError> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO samples (timestamp, pid, process_name, app_name, bytes_sent, bytes_recv)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for sample in samples {
                stmt.execute(params![
                    sample.timestamp,
                    sample.pid,
                    sample.process_name,
                    sample.app_name,
                    sample.bytes_sent as i64,
                    sample.bytes_recv as i64,
                ])?;
            }
        }
        tx.commit()?;
        debug!("inserted {} samples", samples.len());
        Ok(())
    }

    fn get_samples_for_range(
        &self,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<Sample>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT timestamp, pid, process_name, app_name, bytes_sent, bytes_recv
             FROM samples
             WHERE timestamp >= ?1 AND timestamp <= ?2
             ORDER BY timestamp",
        )?;
        let rows = stmt.query_map(params![start_ts, end_ts], Self::map_sample)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn aggregate_daily(&self, date: NaiveDate) -> Result<(), StorageError> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let start_ts = Self::day_start_ts(date);
        let end_ts = start_ts + 86400;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM daily_summary WHERE date = ?1", params![date_str])?;
        tx.execute(
            "INSERT INTO daily_summary (date, app_name, bytes_sent, bytes_recv)
             SELECT ?1, COALESCE(app_name, process_name), SUM(bytes_sent), SUM(bytes_recv)
             FROM samples
             WHERE timestamp >= ?2 AND timestamp < ?3
             GROUP BY COALESCE(app_name, process_name)",
            params![date_str, start_ts, end_ts],
        )?;
        tx.commit()?;
        debug!("aggregated daily summary for {}", date_str);
        Ok(())
    }

    fn get_daily_summary(&self, date: NaiveDate) -> Result<Vec<SummaryRow>, StorageError> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT app_name, bytes_sent, bytes_recv, (bytes_sent + bytes_recv) AS total_bytes
             FROM daily_summary
             WHERE date = ?1
             ORDER BY total_bytes DESC",
        )?;
        let rows = stmt.query_map(params![date_str], |row| {
            Ok(SummaryRow {
                app_name: row.get(0)?,
                bytes_sent: row.get::<_, i64>(1)? as u64,
                bytes_recv: row.get::<_, i64>(2)? as u64,
                total_bytes: row.get::<_, i64>(3)? as u64,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn cleanup_old_data(&self, retention_days: u32) -> Result<usize, StorageError> {
        let cutoff_ts = Utc::now().timestamp() - i64::from(retention_days) * 86400;
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM samples WHERE timestamp < ?1", params![cutoff_ts])?;
        Ok(deleted)
    }

    fn get_available_dates(&self) -> Result<Vec<NaiveDate>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT DISTINCT date FROM daily_summary ORDER BY date DESC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut dates = Vec::new();
        for row in rows {
            if let Ok(date) = NaiveDate::parse_from_str(&row?, "%Y-%m-%d") {
                dates.push(date);
            }
        }
        Ok(dates)
    }
}
