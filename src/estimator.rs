//! Best-effort per-process network I/O estimation

use std::collections::{HashMap, HashSet};

/// Source of cumulative per-process byte counters when the platform exposes
/// none. Implementations must never let a pid's counters decrease across
/// observations while the process holds connections, so the sampler's delta
/// logic can rely on monotonicity.
pub trait NetworkIoEstimator: Send {
    /// Cumulative (bytes_sent, bytes_recv) estimate for this pid as of now.
    fn cumulative_io(&mut self, pid: u32, connection_count: u32) -> (u64, u64);

    /// Drop state for pids no longer observed.
    fn retain(&mut self, live_pids: &HashSet<u32>) {
        let _ = live_pids;
    }
}

pub const DEFAULT_BYTES_PER_CONNECTION: u64 = 1024;

/// Monotonic proxy keyed by active-connection count: each observation advances
/// a pid's counters by `connections * bytes_per_connection`. This is an
/// approximation, not metering: two processes with simultaneous connections
/// are both credited for the same wall-clock interval, so their deltas can
/// double-count system-wide traffic. A precise backend (kernel per-socket
/// accounting) can replace this without touching the sampler.
pub struct ConnectionCountEstimator {
    bytes_per_connection: u64,
    counters: HashMap<u32, (u64, u64)>,
}

impl ConnectionCountEstimator {
    pub fn new(bytes_per_connection: u64) -> Self {
        Self {
            bytes_per_connection,
            counters: HashMap::new(),
        }
    }
}

impl Default for ConnectionCountEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_BYTES_PER_CONNECTION)
    }
}

impl NetworkIoEstimator for ConnectionCountEstimator {
    fn cumulative_io(&mut self, pid: u32, connection_count: u32) -> (u64, u64) {
        let step = u64::from(connection_count) * self.bytes_per_connection;
        let entry = self.counters.entry(pid).or_insert((0, 0));
        entry.0 += step;
        entry.1 += step;
        *entry
    }

    fn retain(&mut self, live_pids: &HashSet<u32>) {
        self.counters.retain(|pid, _| live_pids.contains(pid));
    }
}
