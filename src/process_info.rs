//! Process name resolution with per-pid memoization

use crate::collector::ConnectionProvider;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub process_name: String,
    /// Friendly application name; `None` when resolution degraded.
    pub app_name: Option<String>,
    pub cmdline: String,
}

/// Maps pids to display names, memoized for the resolver's lifetime.
///
/// The resolver cannot detect pid reuse on its own; callers that observe a
/// pid disappearing must call `invalidate` before the pid comes back.
/// Resolution failures yield degraded records rather than errors, so name
/// lookup can never abort a sampling tick. Degraded records are not cached.
pub struct ProcessInfoResolver {
    provider: Arc<dyn ConnectionProvider>,
    cache: Mutex<HashMap<u32, ProcessRecord>>,
}

impl ProcessInfoResolver {
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            provider,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, pid: u32) -> ProcessRecord {
        if let Some(record) = self.cache.lock().unwrap().get(&pid) {
            return record.clone();
        }

        let exe_name = self
            .provider
            .executable_path(pid)
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()));

        let process_name = match exe_name {
            Some(name) => name,
            None => match fs::read_to_string(format!("/proc/{}/comm", pid)) {
                Ok(comm) => comm.trim().to_string(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Self::degraded(pid, "Unknown");
                }
                Err(_) => return Self::degraded(pid, "Error"),
            },
        };

        let cmdline = fs::read_to_string(format!("/proc/{}/cmdline", pid))
            .map(|raw| raw.replace('\0', " ").trim().to_string())
            .unwrap_or_default();

        let record = ProcessRecord {
            pid,
            app_name: Some(clean_process_name(&process_name)),
            process_name,
            cmdline,
        };
        self.cache.lock().unwrap().insert(pid, record.clone());
        record
    }

    pub fn invalidate(&self, pid: u32) {
        self.cache.lock().unwrap().remove(&pid);
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap().clear();
    }

    fn degraded(pid: u32, name: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            process_name: name.to_string(),
            app_name: None,
            cmdline: String::new(),
        }
    }
}

/// Strip a trailing executable extension and capitalize the first letter.
pub fn clean_process_name(name: &str) -> String {
    let base = name
        .strip_suffix(".exe")
        .or_else(|| name.strip_suffix(".bin"))
        .unwrap_or(name);
    let mut chars = base.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
