use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::monitoring::Outcome;

/// Why a set of recovery commands runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryCategory {
    /// Target unhealthy while the network works
    SiteDown,
    /// Network itself unreachable
    WifiDown,
    /// Target healthy again
    Recovery,
}

impl RecoveryCategory {
    /// Category of remediation for a failed check
    pub fn for_failure(outcome: Outcome) -> Self {
        match outcome {
            Outcome::ConnectivityDown => RecoveryCategory::WifiDown,
            _ => RecoveryCategory::SiteDown,
        }
    }

    /// Settings key holding the commands of this category
    pub fn settings_key(self) -> &'static str {
        match self {
            RecoveryCategory::SiteDown => "on_site_fail",
            RecoveryCategory::WifiDown => "on_wifi_fail",
            RecoveryCategory::Recovery => "on_recovery",
        }
    }
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCategory::SiteDown => write!(f, "site-down"),
            RecoveryCategory::WifiDown => write!(f, "wifi-down"),
            RecoveryCategory::Recovery => write!(f, "recovery"),
        }
    }
}

/// A single remediation command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub category: RecoveryCategory,
    pub command: String,
}

impl RecoveryAction {
    pub fn new(category: RecoveryCategory, command: impl Into<String>) -> Self {
        Self { category, command: command.into() }
    }
}

/// Outcome of one recovery command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub action: RecoveryAction,

    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,

    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,

    /// Set when the command did not succeed
    pub error: Option<CommandError>,
}

impl CommandResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// First non-empty line of the output, preferring stderr on failure
    pub fn output_summary(&self) -> Option<&str> {
        fn first_line(text: &str) -> Option<&str> {
            text.lines().map(str::trim).find(|line| !line.is_empty())
        }

        let (primary, secondary) =
            if self.succeeded() { (&self.stdout, &self.stderr) } else { (&self.stderr, &self.stdout) };

        first_line(primary).or_else(|| first_line(secondary))
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(
                f,
                "[{}] `{}` succeeded in {}ms",
                self.action.category,
                self.action.command,
                self.elapsed.as_millis()
            )?,
            Some(error) => write!(f, "[{}] {error}", self.action.category)?,
        }
        if let Some(summary) = self.output_summary() {
            write!(f, " | {summary}")?;
        }
        Ok(())
    }
}
