//! Desktop notifications via `notify-send`

use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, warn};
use watchdog::Notifier;

/// Sends transitions as desktop notifications.
///
/// Best-effort: a missing `notify-send` or a failed send is only logged.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    program: String,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self { program: "notify-send".into() }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) {
        let child = Command::new(&self.program)
            .args(["--app-name", "Tunnel Watchdog", title, message])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match child {
            Ok(mut child) => {
                // reap in the background so the monitor loop never waits on the desktop
                thread::spawn(move || match child.wait() {
                    Ok(status) if status.success() => debug!("Desktop notification sent"),
                    Ok(status) => warn!(%status, "notify-send failed"),
                    Err(error) => warn!(%error, "notify-send failed"),
                });
            }
            Err(error) => debug!(program = %self.program, %error, "Desktop notifications unavailable"),
        }
    }
}
