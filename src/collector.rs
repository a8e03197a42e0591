//! Per-process network connection enumeration

use std::io;
use std::path::PathBuf;

pub use linux::LinuxConnectionProvider;

mod linux;

/// One process with at least one active inet connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub pid: u32,
    pub connection_count: u32,
}

/// Process-info capability consumed by the sampler. Per-pid failures (process
/// gone, access denied) mean "skip this pid this tick", never a fatal error.
pub trait ConnectionProvider: Send + Sync {
    /// All processes holding at least one active network connection.
    fn enumerate_active_connections(&self) -> io::Result<Vec<ConnectionInfo>>;

    fn executable_path(&self, pid: u32) -> Option<PathBuf>;

    /// Cumulative (bytes_sent, bytes_recv) for the process, if the platform
    /// exposes per-process network counters. `None` makes the sampler fall
    /// back to its estimator.
    fn cumulative_io(&self, pid: u32) -> Option<(u64, u64)>;
}
