use netmeter_daemon::collector::{ConnectionInfo, ConnectionProvider};
use netmeter_daemon::process_info::{clean_process_name, ProcessInfoResolver};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const FAKE_PID: u32 = 4_200_010;

struct PathProvider {
    path: Mutex<Option<PathBuf>>,
}

impl PathProvider {
    fn new(path: Option<&str>) -> Self {
        Self {
            path: Mutex::new(path.map(PathBuf::from)),
        }
    }

    fn set_path(&self, path: Option<&str>) {
        *self.path.lock().unwrap() = path.map(PathBuf::from);
    }
}

impl ConnectionProvider for PathProvider {
    fn enumerate_active_connections(&self) -> std::io::Result<Vec<ConnectionInfo>> {
        Ok(vec![])
    }

    fn executable_path(&self, _pid: u32) -> Option<PathBuf> {
        self.path.lock().unwrap().clone()
    }

    fn cumulative_io(&self, _pid: u32) -> Option<(u64, u64)> {
        None
    }
}

#[test]
fn test_resolve_from_executable_path() {
    let provider = Arc::new(PathProvider::new(Some("/opt/google/chrome/chrome")));
    let resolver = ProcessInfoResolver::new(provider);

    let record = resolver.resolve(FAKE_PID);
    assert_eq!(record.pid, FAKE_PID);
    assert_eq!(record.process_name, "chrome");
    assert_eq!(record.app_name.as_deref(), Some("Chrome"));
}

#[test]
fn test_resolution_is_memoized_until_invalidated() {
    let provider = Arc::new(PathProvider::new(Some("/usr/bin/firefox")));
    let resolver = ProcessInfoResolver::new(provider.clone());

    assert_eq!(resolver.resolve(FAKE_PID).process_name, "firefox");

    // A changed executable is not observed while the cache entry lives.
    provider.set_path(Some("/usr/bin/thunderbird"));
    assert_eq!(resolver.resolve(FAKE_PID).process_name, "firefox");

    resolver.invalidate(FAKE_PID);
    assert_eq!(resolver.resolve(FAKE_PID).process_name, "thunderbird");
}

#[test]
fn test_clear_cache() {
    let provider = Arc::new(PathProvider::new(Some("/usr/bin/firefox")));
    let resolver = ProcessInfoResolver::new(provider.clone());
    resolver.resolve(FAKE_PID);

    provider.set_path(Some("/usr/bin/curl"));
    resolver.clear();
    assert_eq!(resolver.resolve(FAKE_PID).process_name, "curl");
}

#[test]
fn test_vanished_process_degrades_to_unknown() {
    // No executable path and no /proc entry for a pid beyond pid_max.
    let provider = Arc::new(PathProvider::new(None));
    let resolver = ProcessInfoResolver::new(provider);

    let record = resolver.resolve(FAKE_PID);
    assert_eq!(record.process_name, "Unknown");
    assert_eq!(record.app_name, None);
    assert!(record.cmdline.is_empty());
}

#[test]
fn test_clean_process_name() {
    assert_eq!(clean_process_name("chrome.exe"), "Chrome");
    assert_eq!(clean_process_name("firefox"), "Firefox");
    assert_eq!(clean_process_name(""), "");
}
