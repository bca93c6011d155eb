use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::trace;

use super::types::{HealthCheckResult, Outcome};

/// Checker trait for a single health-check attempt
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform one attempt against `target`, giving up after `limit`
    async fn attempt(&self, target: &str, limit: Duration) -> HealthCheckResult;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tunnel-watchdog/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    async fn fetch(&self, target: &str) -> Result<(reqwest::StatusCode, usize), reqwest::Error> {
        let response = self.client.get(target).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body.len()))
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn attempt(&self, target: &str, limit: Duration) -> HealthCheckResult {
        let start = Instant::now();

        let fetched = timeout(limit, self.fetch(target)).await;
        let latency = start.elapsed();

        match fetched {
            Err(_) => HealthCheckResult::failure(
                target,
                Outcome::Timeout,
                latency,
                format!("no response within {}ms", limit.as_millis()),
            ),
            Ok(Err(error)) => {
                let outcome = classify_error(&error);
                trace!(url = %target, %outcome, %error, "HTTP attempt failed");
                HealthCheckResult::failure(target, outcome, latency, error.to_string())
            }
            Ok(Ok((status, body_len))) => classify_response(target, status, body_len, latency, limit),
        }
    }
}

/// Map a transport error onto an outcome.
///
/// Connection failures (DNS, refused, unreachable) win over timeouts.
fn classify_error(error: &reqwest::Error) -> Outcome {
    if error.is_connect() {
        Outcome::ConnectivityDown
    } else if error.is_timeout() {
        Outcome::Timeout
    } else {
        Outcome::Error
    }
}

fn classify_response(
    target: &str,
    status: reqwest::StatusCode,
    body_len: usize,
    latency: Duration,
    limit: Duration,
) -> HealthCheckResult {
    let code = status.as_u16();

    if latency > limit {
        HealthCheckResult::failure(target, Outcome::Timeout, latency, "response arrived after the timeout")
            .with_status(code)
    } else if !status.is_success() {
        HealthCheckResult::degraded(target, code, latency, format!("unexpected status {status}"))
    } else if body_len == 0 {
        HealthCheckResult::degraded(target, code, latency, "empty response body")
    } else {
        HealthCheckResult::healthy(target, code, latency)
    }
}
