use super::{ConnectionInfo, ConnectionProvider};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;

const NET_TABLES: &[&str] = &["tcp", "tcp6", "udp", "udp6"];

/// Connection provider backed by procfs. Socket inodes from `/proc/net` are
/// matched against each process's fd table to count connections per pid.
pub struct LinuxConnectionProvider;

impl LinuxConnectionProvider {
    pub fn new() -> Self {
        Self
    }

    /// Inodes of all open inet sockets on the host.
    fn socket_inodes(&self) -> io::Result<HashSet<u64>> {
        let mut inodes = HashSet::new();
        for table in NET_TABLES {
            let content = fs::read_to_string(format!("/proc/net/{}", table))?;
            for line in content.lines().skip(1) {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 10 {
                    continue;
                }
                if let Ok(inode) = fields[9].parse::<u64>() {
                    if inode != 0 {
                        inodes.insert(inode);
                    }
                }
            }
        }
        Ok(inodes)
    }

    /// Number of fds in `/proc/<pid>/fd` referring to one of `inodes`.
    /// Returns `None` when the fd table is unreadable (process gone or not ours).
    fn count_sockets(pid: u32, inodes: &HashSet<u64>) -> Option<u32> {
        let entries = fs::read_dir(format!("/proc/{}/fd", pid)).ok()?;
        let mut count = 0;
        for entry in entries.flatten() {
            let Ok(target) = fs::read_link(entry.path()) else {
                continue;
            };
            let Some(target) = target.to_str() else {
                continue;
            };
            if let Some(inode_str) = target
                .strip_prefix("socket:[")
                .and_then(|s| s.strip_suffix(']'))
            {
                if let Ok(inode) = inode_str.parse::<u64>() {
                    if inodes.contains(&inode) {
                        count += 1;
                    }
                }
            }
        }
        Some(count)
    }
}

impl Default for LinuxConnectionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionProvider for LinuxConnectionProvider {
    fn enumerate_active_connections(&self) -> io::Result<Vec<ConnectionInfo>> {
        let inodes = self.socket_inodes()?;
        let mut connections = Vec::new();
        for entry in fs::read_dir("/proc")?.flatten() {
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            let Ok(pid) = name.parse::<u32>() else {
                continue;
            };
            match Self::count_sockets(pid, &inodes) {
                Some(count) if count > 0 => connections.push(ConnectionInfo {
                    pid,
                    connection_count: count,
                }),
                _ => {}
            }
        }
        Ok(connections)
    }

    fn executable_path(&self, pid: u32) -> Option<PathBuf> {
        fs::read_link(format!("/proc/{}/exe", pid)).ok()
    }

    fn cumulative_io(&self, _pid: u32) -> Option<(u64, u64)> {
        // Linux has no per-process network byte counters without kernel-level
        // accounting (eBPF, nethogs-style pcap). The sampler falls back to the
        // connection-count estimator.
        None
    }
}
