//! Rule-based recommendations for reducing data consumption

use crate::sampler::{Snapshot, TotalUsage};
use std::collections::BTreeMap;
use tracing::info;

/// Default threshold for the high-bandwidth rule (5 MiB/s).
pub const DEFAULT_HIGH_BANDWIDTH_THRESHOLD: u64 = 5 * 1024 * 1024;

const BROWSERS: &[&str] = &["chrome", "chromium", "firefox", "edge"];
const GAME_PLATFORMS: &[&str] = &["steam", "epic", "origin"];
const TORRENT_CLIENTS: &[&str] = &["torrent", "utorrent", "bittorrent", "transmission"];

const SYNC_SERVICES: &[&str] = &[
    "onedrive",
    "dropbox",
    "google drive",
    "googledrivesync",
    "icloud",
    "nextcloud",
    "syncthing",
    "rclone",
    "megasync",
    "pcloud",
    "sync",
    "backup",
];

const SYSTEM_PROCESSES: &[&str] = &[
    "packagekitd",
    "apt",
    "dnf",
    "yum",
    "snapd",
    "fwupd",
    "unattended-upgrade",
    "systemd",
];

fn matches_any(app_lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| app_lower.contains(kw))
}

fn mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Stateless rule evaluator turning a snapshot plus aggregate totals into
/// human-readable advisories. Rule order is fixed; advisories are
/// concatenated in that order, never re-sorted.
pub struct UsageRecommender {
    high_bandwidth_threshold: u64,
}

impl UsageRecommender {
    pub fn new(high_bandwidth_threshold: u64) -> Self {
        Self {
            high_bandwidth_threshold,
        }
    }

    pub fn threshold(&self) -> u64 {
        self.high_bandwidth_threshold
    }

    pub fn set_threshold(&mut self, threshold: u64) {
        self.high_bandwidth_threshold = threshold;
        info!("bandwidth threshold set to {:.2} MB/s", mb(threshold));
    }

    pub fn get_recommendations(&self, snapshot: &Snapshot, totals: &TotalUsage) -> Vec<String> {
        let mut recommendations = Vec::new();
        if snapshot.processes.is_empty() || totals.total == 0 {
            return recommendations;
        }
        let grand_total = totals.total as f64;
        let app_usage = aggregate_by_app(snapshot);

        recommendations.extend(self.check_dominant_apps(&app_usage, grand_total));
        recommendations.extend(self.check_sync_services(&app_usage, grand_total));
        recommendations.extend(self.check_system_processes(&app_usage, grand_total));
        recommendations.extend(self.check_bandwidth_threshold(totals.total));
        recommendations.extend(self.check_moderate_apps(&app_usage, grand_total));

        recommendations
    }

    /// Rule 1: any app above 50% of total gets a tailored advisory.
    fn check_dominant_apps(&self, app_usage: &BTreeMap<String, u64>, grand_total: f64) -> Vec<String> {
        let mut out = Vec::new();
        for (app_name, &total) in app_usage {
            let percentage = total as f64 / grand_total * 100.0;
            if percentage <= 50.0 {
                continue;
            }
            let app_lower = app_name.to_lowercase();
            let action = if matches_any(&app_lower, BROWSERS) {
                "Consider pausing video playback or closing unused tabs."
            } else if matches_any(&app_lower, GAME_PLATFORMS) {
                "Pause game downloads or updates."
            } else if matches_any(&app_lower, TORRENT_CLIENTS) {
                "Pause or limit torrent downloads."
            } else {
                "Consider closing or limiting this application."
            };
            out.push(format!(
                "{} is using {:.0}% of bandwidth ({:.2} MB/s). {}",
                app_name,
                percentage,
                mb(total),
                action
            ));
        }
        out
    }

    /// Rule 2: combined share of known cloud-sync services above 20%.
    fn check_sync_services(&self, app_usage: &BTreeMap<String, u64>, grand_total: f64) -> Vec<String> {
        let mut sync_total = 0u64;
        let mut sync_apps = Vec::new();
        for (app_name, &total) in app_usage {
            if matches_any(&app_name.to_lowercase(), SYNC_SERVICES) {
                sync_total += total;
                sync_apps.push(app_name.as_str());
            }
        }
        if sync_total == 0 {
            return Vec::new();
        }
        let percentage = sync_total as f64 / grand_total * 100.0;
        if percentage <= 20.0 {
            return Vec::new();
        }
        vec![format!(
            "Background sync services ({}) are using {:.0}% of bandwidth ({:.2} MB/s). \
             Consider pausing cloud sync temporarily.",
            sync_apps.join(", "),
            percentage,
            mb(sync_total)
        )]
    }

    /// Rule 3: each matched system process individually above 15%.
    fn check_system_processes(
        &self,
        app_usage: &BTreeMap<String, u64>,
        grand_total: f64,
    ) -> Vec<String> {
        let mut out = Vec::new();
        for (app_name, &total) in app_usage {
            if !matches_any(&app_name.to_lowercase(), SYSTEM_PROCESSES) {
                continue;
            }
            let percentage = total as f64 / grand_total * 100.0;
            if percentage > 15.0 {
                out.push(format!(
                    "System process ({}) is using {:.0}% of bandwidth ({:.2} MB/s). \
                     This may be package updates or system maintenance.",
                    app_name,
                    percentage,
                    mb(total)
                ));
            }
        }
        out
    }

    /// Rule 4: total bandwidth above the configured threshold.
    fn check_bandwidth_threshold(&self, total: u64) -> Vec<String> {
        if total <= self.high_bandwidth_threshold {
            return Vec::new();
        }
        vec![format!(
            "High bandwidth usage detected: {:.2} MB/s (threshold: {:.2} MB/s). \
             Consider enabling data saver mode in browsers and streaming apps.",
            mb(total),
            mb(self.high_bandwidth_threshold)
        )]
    }

    /// Rule 5: three or more apps each holding a 10-50% share (inclusive).
    fn check_moderate_apps(&self, app_usage: &BTreeMap<String, u64>, grand_total: f64) -> Vec<String> {
        let mut moderate: Vec<(&str, f64, u64)> = Vec::new();
        for (app_name, &total) in app_usage {
            let percentage = total as f64 / grand_total * 100.0;
            if (10.0..=50.0).contains(&percentage) {
                moderate.push((app_name.as_str(), percentage, total));
            }
        }
        if moderate.len() < 3 {
            return Vec::new();
        }
        let combined: u64 = moderate.iter().map(|(_, _, total)| total).sum();
        let listed = moderate
            .iter()
            .take(3)
            .map(|(name, pct, _)| format!("{} ({:.0}%)", name, pct))
            .collect::<Vec<_>>()
            .join(", ");
        vec![format!(
            "Multiple applications are actively using bandwidth: {}. \
             Combined usage: {:.2} MB/s. Consider closing non-essential applications.",
            listed,
            mb(combined)
        )]
    }
}

impl Default for UsageRecommender {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_BANDWIDTH_THRESHOLD)
    }
}

/// Per-app totals, keyed by app name falling back to process name.
/// BTreeMap keeps per-rule iteration deterministic.
fn aggregate_by_app(snapshot: &Snapshot) -> BTreeMap<String, u64> {
    let mut app_usage: BTreeMap<String, u64> = BTreeMap::new();
    for usage in snapshot.processes.values() {
        let app_name = usage
            .app_name
            .clone()
            .unwrap_or_else(|| usage.process_name.clone());
        *app_usage.entry(app_name).or_insert(0) += usage.bytes_sent + usage.bytes_recv;
    }
    app_usage
}
