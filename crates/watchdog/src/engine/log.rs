//! Append-only event log collaborators.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;
use logger::{RotatingFile, RotationPolicy};
use tracing::{info, warn};

/// Append-only, line-oriented sink for the engine's event log
pub trait LogSink: Send + Sync {
    fn append(&self, line: &str);
}

/// Forwards event lines to `tracing` at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn append(&self, line: &str) {
        info!(target: "watchdog::events", "{line}");
    }
}

/// Writes `[YYYY-MM-DD HH:MM:SS] line` to a size-rotated file
#[derive(Debug)]
pub struct FileLog {
    file: Mutex<RotatingFile>,
}

impl FileLog {
    /// Open with the default rotation (1 MiB, 3 backups)
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::with_policy(path, RotationPolicy::default())
    }

    pub fn with_policy(path: impl AsRef<Path>, policy: RotationPolicy) -> io::Result<Self> {
        Ok(Self { file: Mutex::new(RotatingFile::open(path, policy)?) })
    }
}

impl LogSink for FileLog {
    fn append(&self, line: &str) {
        let stamped = format!("[{}] {line}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(error) = file.write_all(stamped.as_bytes()).and_then(|()| file.flush()) {
            warn!(path = %file.path().display(), %error, "Failed to append to event log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_log_appends_timestamped_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchdog.log");
        let log = FileLog::open(&path).unwrap();

        log.append("site online");
        log.append("threshold crossed");

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] site online"));
        assert!(lines[1].ends_with("] threshold crossed"));
        // "[2024-01-01 00:00:00] " is 22 bytes
        assert_eq!(lines[0].find(']'), Some(20));
    }

    #[test]
    fn test_file_log_rotates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchdog.log");
        let log = FileLog::with_policy(&path, RotationPolicy { max_bytes: 40, backups: 1 }).unwrap();

        log.append("first line of the log");
        log.append("second line of the log");

        assert!(dir.path().join("watchdog.log.1").exists());
        assert!(std::fs::read_to_string(&path).unwrap().contains("second line"));
    }
}
