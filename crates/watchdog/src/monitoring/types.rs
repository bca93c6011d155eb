use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// Classification of a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Success status with a non-empty body
    Healthy,
    /// Response received, but with a failing status or an empty body
    Degraded,
    /// The connection could not be established at all
    ConnectivityDown,
    /// No complete response within the per-attempt timeout
    Timeout,
    /// Any other failure (bad URL, broken body, ...)
    Error,
}

impl Outcome {
    pub fn is_healthy(self) -> bool {
        matches!(self, Outcome::Healthy)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Healthy => write!(f, "healthy"),
            Outcome::Degraded => write!(f, "degraded"),
            Outcome::ConnectivityDown => write!(f, "connectivity down"),
            Outcome::Timeout => write!(f, "timeout"),
            Outcome::Error => write!(f, "error"),
        }
    }
}

/// Result of a health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// URL that was checked
    pub target: String,

    /// Classification of the check
    pub outcome: Outcome,

    /// HTTP status code (if a response arrived)
    pub status_code: Option<u16>,

    /// Human readable detail, mostly for failures
    pub message: Option<String>,

    /// Time until the response (or failure) of the reported attempt
    pub latency: Duration,

    /// Attempts made before this result was reported
    pub attempts: u32,
}

impl HealthCheckResult {
    fn new(target: impl Into<String>, outcome: Outcome, latency: Duration) -> Self {
        Self { target: target.into(), outcome, status_code: None, message: None, latency, attempts: 1 }
    }

    /// Success status with a body
    pub fn healthy(target: impl Into<String>, status_code: u16, latency: Duration) -> Self {
        Self::new(target, Outcome::Healthy, latency).with_status(status_code)
    }

    /// Response arrived but is not usable
    pub fn degraded(
        target: impl Into<String>,
        status_code: u16,
        latency: Duration,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(target, Outcome::Degraded, latency).with_status(status_code).with_message(reason)
    }

    /// Mark the check as failed without a usable response
    pub fn failure(
        target: impl Into<String>,
        outcome: Outcome,
        latency: Duration,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(target, outcome, latency).with_message(reason)
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.outcome.is_healthy()
    }

    /// Typed error for a non-healthy result
    pub fn error(&self) -> Option<ProbeError> {
        let reason = self.message.clone().unwrap_or_else(|| self.outcome.to_string());
        match self.outcome {
            Outcome::Healthy => None,
            Outcome::Degraded => Some(ProbeError::Degraded { status: self.status_code, reason }),
            Outcome::ConnectivityDown => Some(ProbeError::ConnectivityDown(reason)),
            Outcome::Timeout => Some(ProbeError::Timeout(self.latency)),
            Outcome::Error => Some(ProbeError::Unknown(reason)),
        }
    }
}

impl fmt::Display for HealthCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is {}", self.target, self.outcome)?;
        if let Some(code) = self.status_code {
            write!(f, " (HTTP {code})")?;
        }
        write!(f, " after {}ms", self.latency.as_millis())?;
        if self.attempts > 1 {
            write!(f, ", {} attempts", self.attempts)?;
        }
        if let (false, Some(message)) = (self.is_healthy(), &self.message) {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}
