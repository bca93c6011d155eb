use std::io::Error as IoError;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Settings could not be located, read, parsed, written or validated
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no settings path available: neither XDG_CONFIG_HOME nor a home directory is set")]
    PathUnavailable,
    #[error("failed to read settings from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("failed to write settings to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("malformed settings in {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("failed to serialize settings: {0}")]
    Serialize(String),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Typed reason a health check did not come back healthy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("connectivity down: {0}")]
    ConnectivityDown(String),
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("degraded response{}: {reason}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Degraded { status: Option<u16>, reason: String },
    #[error("check failed: {0}")]
    Unknown(String),
}

/// A recovery command did not complete successfully
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("failed to spawn `{command}`: {reason}")]
    Spawn { command: String, reason: String },
    #[error("`{command}` exited with {}", .code.map(|c| format!("status {c}")).unwrap_or_else(|| "a signal".into()))]
    NonZeroExit { command: String, code: Option<i32> },
    #[error("`{command}` did not finish within {}s and was killed", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },
}

/// Errors that prevent an engine from being built
#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no tokio runtime available to run the monitor loop")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_display() {
        let degraded = ProbeError::Degraded { status: Some(503), reason: "unexpected status".into() };
        assert_eq!(degraded.to_string(), "degraded response (503): unexpected status");

        let empty = ProbeError::Degraded { status: None, reason: "empty body".into() };
        assert_eq!(empty.to_string(), "degraded response: empty body");

        assert_eq!(ProbeError::Timeout(Duration::from_millis(1500)).to_string(), "timed out after 1500ms");
    }

    #[test]
    fn test_command_error_display() {
        let exit = CommandError::NonZeroExit { command: "false".into(), code: Some(1) };
        assert_eq!(exit.to_string(), "`false` exited with status 1");

        let signal = CommandError::NonZeroExit { command: "sleep 9".into(), code: None };
        assert_eq!(signal.to_string(), "`sleep 9` exited with a signal");
    }
}
