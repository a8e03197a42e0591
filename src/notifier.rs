//! Desktop notification sender

use notify_rust::Notification;
use tracing::warn;

pub struct Notifier;

impl Notifier {
    pub fn new() -> Self {
        Self
    }

    /// Best-effort; a missing notification daemon must not affect monitoring.
    pub fn send(&self, summary: &str, body: &str) {
        let result = Notification::new()
            .summary(summary)
            .body(body)
            .appname("NetMeter")
            .show();
        if let Err(e) = result {
            warn!("failed to send notification: {}", e);
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
