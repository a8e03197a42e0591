//! Buffered sample persistence, decoupled from the sampling cadence

use crate::db::{Sample, SampleStore};
use crate::sampler::Snapshot;
use chrono::Utc;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on buffered samples under sustained storage outage.
/// Oldest-over-cap entries are dropped, newest retained.
pub const MAX_BUFFERED_SAMPLES: usize = 1000;

/// Bounded ingestion queue between the sampler and storage. `enqueue` is
/// non-blocking; a background task swaps the buffer out under the mutex and
/// writes the batch outside it, so storage latency never stalls the sampler.
pub struct DataPersister {
    store: Arc<dyn SampleStore>,
    flush_interval: Duration,
    buffer: Mutex<Vec<Sample>>,
    running: AtomicBool,
    shutdown: Notify,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DataPersister {
    pub fn new(store: Arc<dyn SampleStore>, flush_interval: Duration) -> Self {
        Self {
            store,
            flush_interval,
            buffer: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("persister already running");
            return;
        }
        let persister = Arc::clone(self);
        let handle = tokio::spawn(async move { persister.run().await });
        *self.handle.lock().unwrap() = Some(handle);
        info!("data persister started");
    }

    /// Idempotent. Joins the flush loop with a bounded timeout, then performs
    /// one final flush so no buffered sample is lost on clean shutdown.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_waiters();
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                warn!("flush loop did not stop within {:?}", STOP_TIMEOUT);
            }
        }
        self.flush();
        info!("data persister stopped");
    }

    pub fn enqueue(&self, sample: Sample) {
        self.buffer.lock().unwrap().push(sample);
    }

    /// Queue every entry of a snapshot that saw actual byte activity.
    pub fn enqueue_snapshot(&self, snapshot: &Snapshot, timestamp: Option<i64>) {
        let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp());
        let mut buffer = self.buffer.lock().unwrap();
        for (&pid, usage) in &snapshot.processes {
            if usage.bytes_sent > 0 || usage.bytes_recv > 0 {
                buffer.push(Sample {
                    timestamp,
                    pid,
                    process_name: usage.process_name.clone(),
                    app_name: usage.app_name.clone(),
                    bytes_sent: usage.bytes_sent,
                    bytes_recv: usage.bytes_recv,
                });
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    /// Swap the buffer for an empty one and write the batch. On failure the
    /// batch is re-merged ahead of anything enqueued meanwhile, capped at the
    /// most recent `MAX_BUFFERED_SAMPLES` entries.
    pub fn flush(&self) {
        let batch = mem::take(&mut *self.buffer.lock().unwrap());
        if batch.is_empty() {
            return;
        }
        match self.store.insert_samples_batch(&batch) {
            Ok(()) => debug!("persisted {} samples", batch.len()),
            Err(e) => {
                error!("failed to persist {} samples: {}", batch.len(), e);
                let mut buffer = self.buffer.lock().unwrap();
                let mut merged = batch;
                merged.append(&mut buffer);
                if merged.len() > MAX_BUFFERED_SAMPLES {
                    let excess = merged.len() - MAX_BUFFERED_SAMPLES;
                    merged.drain(..excess);
                }
                *buffer = merged;
            }
        }
    }

    async fn run(&self) {
        info!("flush loop started");
        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(self.flush_interval) => {}
            }
            self.flush();
        }
        info!("flush loop exited");
    }
}
