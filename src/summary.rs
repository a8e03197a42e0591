//! Daily rollup scheduling and raw-sample retention

use crate::db::{SampleStore, StorageError};
use chrono::{Local, NaiveDate, Timelike};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const DEFAULT_RETENTION_DAYS: u32 = 90;
pub const DEFAULT_CLEANUP_HOUR: u32 = 2;
const CHECK_INTERVAL: Duration = Duration::from_secs(3600);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the once-per-day rollup of yesterday's samples and the daily
/// retention sweep, on an hourly check cadence plus one check at startup.
pub struct SummaryManager {
    store: Arc<dyn SampleStore>,
    retention_days: u32,
    cleanup_hour: u32,
    check_interval: Duration,
    running: AtomicBool,
    shutdown: Notify,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SummaryManager {
    pub fn new(store: Arc<dyn SampleStore>, retention_days: u32, cleanup_hour: u32) -> Self {
        Self {
            store,
            retention_days,
            cleanup_hour,
            check_interval: CHECK_INTERVAL,
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("summary manager already running");
            return;
        }
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move { manager.run().await });
        *self.handle.lock().unwrap() = Some(handle);
        info!("summary manager started");
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_waiters();
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                warn!("summary loop did not stop within {:?}", STOP_TIMEOUT);
            }
        }
        info!("summary manager stopped");
    }

    /// Aggregate yesterday's samples once per calendar day. Returns the new
    /// marker value; on failure the marker is not advanced so the next check
    /// retries. Safe to call redundantly.
    pub fn aggregate_if_new_day(
        &self,
        today: NaiveDate,
        last_aggregated: Option<NaiveDate>,
    ) -> Option<NaiveDate> {
        if last_aggregated == Some(today) {
            return last_aggregated;
        }
        let Some(yesterday) = today.pred_opt() else {
            return last_aggregated;
        };
        match self.store.aggregate_daily(yesterday) {
            Ok(()) => {
                info!("aggregated daily summary for {}", yesterday);
                Some(today)
            }
            Err(e) => {
                error!("failed to aggregate {}: {}", yesterday, e);
                last_aggregated
            }
        }
    }

    /// Recompute the rollup for one date. Always safe to re-run
    /// (delete-then-insert semantics in the store).
    pub fn aggregate_date(&self, date: NaiveDate) -> Result<(), StorageError> {
        info!("aggregating data for {}", date);
        self.store.aggregate_daily(date)
    }

    /// Aggregate each date in `[start, end]` in order. A failure on one date
    /// is logged and does not abort subsequent dates.
    pub fn aggregate_date_range(&self, start: NaiveDate, end: NaiveDate) {
        let mut current = start;
        while current <= end {
            if let Err(e) = self.aggregate_date(current) {
                error!("failed to aggregate {}: {}", current, e);
            }
            match current.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }
    }

    /// Delete raw samples past the retention horizon.
    pub fn run_retention_sweep(&self) -> Result<usize, StorageError> {
        let deleted = self.store.cleanup_old_data(self.retention_days)?;
        if deleted > 0 {
            info!("retention sweep removed {} old samples", deleted);
        }
        Ok(deleted)
    }

    async fn run(&self) {
        info!("summary loop started");
        // Loop-local state: this task is the only reader and writer.
        let mut last_aggregated: Option<NaiveDate> = None;
        let mut last_swept: Option<NaiveDate> = None;
        let mut first_check = true;

        while self.running.load(Ordering::SeqCst) {
            let now = Local::now();
            let today = now.date_naive();

            last_aggregated = self.aggregate_if_new_day(today, last_aggregated);

            if first_check || (now.hour() == self.cleanup_hour && last_swept != Some(today)) {
                if let Err(e) = self.run_retention_sweep() {
                    error!("retention sweep failed: {}", e);
                } else {
                    last_swept = Some(today);
                }
                first_check = false;
            }

            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(self.check_interval) => {}
            }
        }
        info!("summary loop exited");
    }
}
