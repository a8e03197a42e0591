//! Periodic per-process network usage sampling

use crate::collector::ConnectionProvider;
use crate::estimator::NetworkIoEstimator;
use crate::process_info::ProcessInfoResolver;
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const BROADCAST_CAPACITY: usize = 64;

/// One process's usage within a single tick. Byte counts are interval deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessUsage {
    pub process_name: String,
    pub app_name: Option<String>,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub connections: u32,
}

/// Point-in-time map of active processes for one sampling tick. Only
/// processes with observed activity (non-zero delta or at least one
/// connection) are present.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub taken_at: i64,
    pub processes: HashMap<u32, ProcessUsage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TotalUsage {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopProcess {
    pub pid: u32,
    pub process_name: String,
    pub app_name: Option<String>,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub total: u64,
}

impl Snapshot {
    pub fn total_bandwidth(&self) -> TotalUsage {
        let bytes_sent = self.processes.values().map(|p| p.bytes_sent).sum();
        let bytes_recv = self.processes.values().map(|p| p.bytes_recv).sum();
        TotalUsage {
            bytes_sent,
            bytes_recv,
            total: bytes_sent + bytes_recv,
        }
    }

    /// Top `n` processes by total bandwidth, descending; ties broken by pid.
    pub fn top_processes(&self, n: usize) -> Vec<TopProcess> {
        let mut entries: Vec<TopProcess> = self
            .processes
            .iter()
            .map(|(&pid, usage)| TopProcess {
                pid,
                process_name: usage.process_name.clone(),
                app_name: usage.app_name.clone(),
                bytes_sent: usage.bytes_sent,
                bytes_recv: usage.bytes_recv,
                total: usage.bytes_sent + usage.bytes_recv,
            })
            .collect();
        entries.sort_by_key(|entry| (std::cmp::Reverse(entry.total), entry.pid));
        entries.truncate(n);
        entries
    }
}

/// Captures per-process network deltas on a fixed cadence and publishes an
/// immutable snapshot per tick. One dedicated task per sampler instance;
/// ticks never interleave.
pub struct NetworkSampler {
    provider: Arc<dyn ConnectionProvider>,
    resolver: Arc<ProcessInfoResolver>,
    estimator: Mutex<Box<dyn NetworkIoEstimator>>,
    interval: Duration,
    previous_counters: Mutex<HashMap<u32, (u64, u64)>>,
    latest: Mutex<Snapshot>,
    tx: broadcast::Sender<Snapshot>,
    permission_warning: Mutex<Option<String>>,
    running: AtomicBool,
    shutdown: Notify,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkSampler {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        resolver: Arc<ProcessInfoResolver>,
        estimator: Box<dyn NetworkIoEstimator>,
        interval: Duration,
    ) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            provider,
            resolver,
            estimator: Mutex::new(estimator),
            interval,
            previous_counters: Mutex::new(HashMap::new()),
            latest: Mutex::new(Snapshot::default()),
            tx,
            permission_warning: Mutex::new(None),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("sampler already running");
            return;
        }
        let sampler = Arc::clone(self);
        let handle = tokio::spawn(async move { sampler.run().await });
        *self.handle.lock().unwrap() = Some(handle);
        info!("network sampler started");
    }

    /// Idempotent; joins the capture loop with a bounded timeout.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_waiters();
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                warn!("sampler loop did not stop within {:?}", STOP_TIMEOUT);
            }
        }
        info!("network sampler stopped");
    }

    /// New receiver for per-tick snapshots. Every receiver gets its own clone,
    /// so a slow consumer cannot stall the loop or other consumers.
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    pub fn latest_snapshot(&self) -> Snapshot {
        self.latest.lock().unwrap().clone()
    }

    pub fn total_bandwidth(&self) -> TotalUsage {
        self.latest.lock().unwrap().total_bandwidth()
    }

    pub fn top_processes(&self, n: usize) -> Vec<TopProcess> {
        self.latest.lock().unwrap().top_processes(n)
    }

    /// Latched advisory raised the first time a tick yields no data at all.
    pub fn permission_warning(&self) -> Option<String> {
        self.permission_warning.lock().unwrap().clone()
    }

    async fn run(&self) {
        info!("sampling loop started");
        while self.running.load(Ordering::SeqCst) {
            let started = Instant::now();
            let delay = match self.capture_and_publish() {
                Ok(()) => self.interval.saturating_sub(started.elapsed()),
                Err(e) => {
                    // Loop-level errors degrade to retry-next-interval;
                    // only stop() terminates the loop.
                    error!("sampling tick failed: {}", e);
                    self.interval
                }
            };
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("sampling loop exited");
    }

    fn capture_and_publish(&self) -> io::Result<()> {
        let snapshot = self.capture_snapshot()?;
        *self.latest.lock().unwrap() = snapshot.clone();
        // No receivers is fine; the daemon may run headless.
        let _ = self.tx.send(snapshot);
        Ok(())
    }

    /// One capture pass: enumerate connected processes, diff cumulative
    /// counters against the previous tick, and build the snapshot.
    pub fn capture_snapshot(&self) -> io::Result<Snapshot> {
        let connections = self.provider.enumerate_active_connections()?;

        let mut current_counters = HashMap::new();
        let mut processes = HashMap::new();
        {
            let previous = self.previous_counters.lock().unwrap();
            let mut estimator = self.estimator.lock().unwrap();

            for info in connections {
                if info.connection_count == 0 {
                    continue;
                }
                let (sent, recv) = match self.provider.cumulative_io(info.pid) {
                    Some(io) => io,
                    None => estimator.cumulative_io(info.pid, info.connection_count),
                };
                current_counters.insert(info.pid, (sent, recv));

                // First-seen pids get delta 0; no synthetic baseline.
                let (delta_sent, delta_recv) = match previous.get(&info.pid) {
                    Some(&(prev_sent, prev_recv)) => (
                        sent.saturating_sub(prev_sent),
                        recv.saturating_sub(prev_recv),
                    ),
                    None => (0, 0),
                };

                if delta_sent > 0 || delta_recv > 0 || info.connection_count > 0 {
                    let record = self.resolver.resolve(info.pid);
                    processes.insert(
                        info.pid,
                        ProcessUsage {
                            process_name: record.process_name,
                            app_name: record.app_name,
                            bytes_sent: delta_sent,
                            bytes_recv: delta_recv,
                            connections: info.connection_count,
                        },
                    );
                }
            }

            let live: HashSet<u32> = current_counters.keys().copied().collect();
            estimator.retain(&live);
        }

        // Replace previous counters wholesale: a vanished pid must never be
        // diffed against stale counters if the OS reuses it.
        {
            let mut previous = self.previous_counters.lock().unwrap();
            for pid in previous.keys() {
                if !current_counters.contains_key(pid) {
                    self.resolver.invalidate(*pid);
                }
            }
            *previous = current_counters;
        }

        if processes.is_empty() {
            let mut warning = self.permission_warning.lock().unwrap();
            if warning.is_none() {
                let message = "Limited network data available. For full per-process \
                               statistics, run with elevated privileges."
                    .to_string();
                warn!("{}", message);
                *warning = Some(message);
            }
        }

        Ok(Snapshot {
            taken_at: Utc::now().timestamp(),
            processes,
        })
    }
}
