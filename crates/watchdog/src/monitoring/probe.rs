use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::checker::{Checker, HttpChecker};
use super::types::{HealthCheckResult, Outcome};

/// Health probe - one check cycle of up to `attempts` sequential attempts
#[derive(Clone)]
pub struct HealthProbe {
    checker: Arc<dyn Checker>,
}

impl HealthProbe {
    /// Create a probe backed by a real HTTP client
    pub fn http() -> Result<Self, reqwest::Error> {
        Ok(Self::new(Arc::new(HttpChecker::new()?)))
    }

    /// Create a probe around any checker
    pub fn new(checker: Arc<dyn Checker>) -> Self {
        Self { checker }
    }

    /// Run one check cycle, waiting `retry_delay` between failed attempts.
    ///
    /// The first healthy attempt wins. If every attempt fails, the last
    /// attempt's classification is returned as-is.
    pub async fn check(
        &self,
        url: &str,
        attempts: u32,
        per_attempt_timeout: Duration,
        retry_delay: Duration,
    ) -> HealthCheckResult {
        let attempts = attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = self.checker.attempt(url, per_attempt_timeout).await.with_attempts(attempt);
            if result.is_healthy() || attempt >= attempts {
                return result;
            }

            debug!(
                %url,
                attempt,
                attempts,
                outcome = %result.outcome,
                "Health check attempt failed, retrying"
            );
            attempt += 1;
            if !retry_delay.is_zero() {
                tokio::time::sleep(retry_delay).await;
            }
        }
    }

    /// Tell a dead target apart from a dead network.
    ///
    /// When the target could not be connected to but `connectivity_url`
    /// answers, the failure belongs to the target: the result is
    /// reclassified as [`Outcome::Error`] so it routes to site remediation.
    pub async fn confirm_connectivity(
        &self,
        result: HealthCheckResult,
        connectivity_url: Option<&str>,
        per_attempt_timeout: Duration,
    ) -> HealthCheckResult {
        let Some(connectivity_url) = connectivity_url else {
            return result;
        };
        if result.outcome != Outcome::ConnectivityDown {
            return result;
        }

        let reference = self.checker.attempt(connectivity_url, per_attempt_timeout).await;
        if reference.is_healthy() {
            debug!(target_url = %result.target, %connectivity_url, "Network is up, target unreachable");
            let detail = result.message.clone().unwrap_or_else(|| result.outcome.to_string());
            HealthCheckResult {
                outcome: Outcome::Error,
                message: Some(format!("target unreachable while network is up ({detail})")),
                ..result
            }
        } else {
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Checker replaying scripted outcomes, repeating the last one
    struct Scripted {
        outcomes: Mutex<VecDeque<Outcome>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(outcomes: &[Outcome]) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.iter().copied().collect()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Checker for Scripted {
        async fn attempt(&self, target: &str, _limit: Duration) -> HealthCheckResult {
            self.calls.lock().unwrap().push(target.to_string());
            let mut outcomes = self.outcomes.lock().unwrap();
            let outcome = if outcomes.len() > 1 {
                outcomes.pop_front().unwrap()
            } else {
                *outcomes.front().unwrap()
            };
            match outcome {
                Outcome::Healthy => HealthCheckResult::healthy(target, 200, Duration::ZERO),
                Outcome::Degraded => HealthCheckResult::degraded(target, 500, Duration::ZERO, "boom"),
                other => HealthCheckResult::failure(target, other, Duration::ZERO, "scripted"),
            }
        }
    }

    fn probe(checker: &Arc<Scripted>) -> HealthProbe {
        HealthProbe::new(checker.clone())
    }

    #[tokio::test]
    async fn test_first_healthy_short_circuits() {
        let checker = Scripted::new(&[Outcome::Timeout, Outcome::Healthy, Outcome::Degraded]);

        let result = probe(&checker).check("https://x.test", 3, Duration::from_secs(1), Duration::ZERO).await;

        assert_eq!(result.outcome, Outcome::Healthy);
        assert_eq!(result.attempts, 2);
        assert_eq!(checker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_report_last_failure() {
        let checker = Scripted::new(&[Outcome::ConnectivityDown, Outcome::Timeout, Outcome::Degraded]);

        let result = probe(&checker).check("https://x.test", 3, Duration::from_secs(1), Duration::ZERO).await;

        assert_eq!(result.outcome, Outcome::Degraded);
        assert_eq!(result.status_code, Some(500));
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_checks_once() {
        let checker = Scripted::new(&[Outcome::Timeout]);

        let result = probe(&checker).check("https://x.test", 0, Duration::from_secs(1), Duration::ZERO).await;

        assert_eq!(result.outcome, Outcome::Timeout);
        assert_eq!(checker.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delay_between_failed_attempts() {
        let checker = Scripted::new(&[Outcome::Error]);
        let probe = HealthProbe::new(checker.clone());

        let started = tokio::time::Instant::now();
        probe.check("https://x.test", 3, Duration::from_secs(1), Duration::from_secs(2)).await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(4), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_connectivity_confirmation_reclassifies() {
        let checker = Scripted::new(&[Outcome::Healthy]);
        let down = HealthCheckResult::failure(
            "https://x.test",
            Outcome::ConnectivityDown,
            Duration::ZERO,
            "dns error",
        );

        let result = probe(&checker)
            .confirm_connectivity(down, Some("https://1.1.1.1"), Duration::from_secs(1))
            .await;

        assert_eq!(result.outcome, Outcome::Error);
        assert_eq!(result.target, "https://x.test");
        assert_eq!(checker.calls(), vec!["https://1.1.1.1".to_string()]);
    }

    #[tokio::test]
    async fn test_connectivity_confirmation_keeps_network_failure() {
        let checker = Scripted::new(&[Outcome::ConnectivityDown]);
        let down =
            HealthCheckResult::failure("https://x.test", Outcome::ConnectivityDown, Duration::ZERO, "refused");

        let result = probe(&checker)
            .confirm_connectivity(down, Some("https://1.1.1.1"), Duration::from_secs(1))
            .await;

        assert_eq!(result.outcome, Outcome::ConnectivityDown);
    }

    #[tokio::test]
    async fn test_connectivity_confirmation_skipped() {
        let checker = Scripted::new(&[Outcome::Healthy]);
        let degraded = HealthCheckResult::degraded("https://x.test", 502, Duration::ZERO, "bad gateway");

        let unchanged = probe(&checker)
            .confirm_connectivity(degraded.clone(), Some("https://1.1.1.1"), Duration::from_secs(1))
            .await;
        assert_eq!(unchanged, degraded);

        let down =
            HealthCheckResult::failure("https://x.test", Outcome::ConnectivityDown, Duration::ZERO, "refused");
        let unchanged = probe(&checker).confirm_connectivity(down.clone(), None, Duration::from_secs(1)).await;
        assert_eq!(unchanged, down);

        assert!(checker.calls().is_empty());
    }
}
