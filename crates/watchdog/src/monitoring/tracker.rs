//! Failure-threshold state machine.
//!
//! Every health check result produces exactly one [`Transition`]. Events
//! are emitted when consecutive failures reach the threshold (and every
//! further multiple of it while the target stays down) and when a healthy
//! result follows anything that was not healthy.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{HealthCheckResult, Outcome};

/// Tracked health of the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    Unknown,
    Healthy,
    /// Failing, but below the threshold (holds the failure count)
    Degraded(u32),
    Down,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerState::Unknown => write!(f, "unknown"),
            TrackerState::Healthy => write!(f, "healthy"),
            TrackerState::Degraded(count) => write!(f, "degraded ({count})"),
            TrackerState::Down => write!(f, "down"),
        }
    }
}

/// Event produced by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerEvent {
    /// Consecutive failures reached the threshold; carries the latest classification
    ThresholdCrossed(Outcome),
    /// Healthy again after a non-healthy state
    Recovered,
}

/// One step of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TrackerState,
    pub to: TrackerState,
    pub event: Option<TrackerEvent>,
    /// Consecutive failures after this step
    pub consecutive_failures: u32,
}

/// Snapshot of the tracker, published after every check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailureState {
    pub consecutive_failures: u32,
    pub last_outcome: Option<Outcome>,
    /// `None` until the first check completes
    pub was_online: Option<bool>,
}

/// Consumes classified results and reports threshold crossings and recoveries
#[derive(Debug, Clone)]
pub struct FailureTracker {
    state: TrackerState,
    failures: FailureState,
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureTracker {
    pub fn new() -> Self {
        Self { state: TrackerState::Unknown, failures: FailureState::default() }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn failure_state(&self) -> FailureState {
        self.failures
    }

    /// Feed one result into the state machine
    pub fn observe(&mut self, result: &HealthCheckResult, failure_threshold: u32) -> Transition {
        self.advance(result.outcome, failure_threshold)
    }

    /// Feed one outcome into the state machine
    pub fn advance(&mut self, outcome: Outcome, failure_threshold: u32) -> Transition {
        let threshold = failure_threshold.max(1);
        let from = self.state;

        let (to, event) = if outcome.is_healthy() {
            self.failures.consecutive_failures = 0;
            let event = (from != TrackerState::Healthy).then_some(TrackerEvent::Recovered);
            (TrackerState::Healthy, event)
        } else {
            let count = self.failures.consecutive_failures.saturating_add(1);
            self.failures.consecutive_failures = count;
            if count >= threshold {
                let event = (count % threshold == 0).then_some(TrackerEvent::ThresholdCrossed(outcome));
                (TrackerState::Down, event)
            } else {
                (TrackerState::Degraded(count), None)
            }
        };

        self.state = to;
        self.failures.last_outcome = Some(outcome);
        self.failures.was_online = Some(outcome.is_healthy());

        Transition { from, to, event, consecutive_failures: self.failures.consecutive_failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(tracker: &mut FailureTracker, outcomes: &[Outcome], threshold: u32) -> Vec<Transition> {
        outcomes.iter().map(|outcome| tracker.advance(*outcome, threshold)).collect()
    }

    fn crossings(transitions: &[Transition]) -> Vec<usize> {
        transitions
            .iter()
            .enumerate()
            .filter(|(_, t)| matches!(t.event, Some(TrackerEvent::ThresholdCrossed(_))))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_initial_state() {
        let tracker = FailureTracker::new();
        assert_eq!(tracker.state(), TrackerState::Unknown);
        assert_eq!(tracker.failure_state(), FailureState::default());
    }

    #[test]
    fn test_threshold_crossed_exactly_on_nth_failure() {
        let mut tracker = FailureTracker::new();
        let transitions = feed(&mut tracker, &[Outcome::Degraded; 3], 3);

        assert_eq!(crossings(&transitions), vec![2]);
        assert_eq!(transitions[0].to, TrackerState::Degraded(1));
        assert_eq!(transitions[1].to, TrackerState::Degraded(2));
        assert_eq!(transitions[2].to, TrackerState::Down);
        assert_eq!(transitions[2].event, Some(TrackerEvent::ThresholdCrossed(Outcome::Degraded)));
    }

    #[test]
    fn test_crossing_carries_latest_classification() {
        let mut tracker = FailureTracker::new();
        let transitions = feed(&mut tracker, &[Outcome::Timeout, Outcome::ConnectivityDown], 2);

        assert_eq!(transitions[1].event, Some(TrackerEvent::ThresholdCrossed(Outcome::ConnectivityDown)));
    }

    #[test]
    fn test_failures_keep_counting_after_crossing() {
        let mut tracker = FailureTracker::new();
        let transitions = feed(&mut tracker, &[Outcome::Error; 7], 3);

        assert_eq!(crossings(&transitions), vec![2, 5]);
        assert_eq!(tracker.failure_state().consecutive_failures, 7);
        assert!(transitions[3..].iter().all(|t| t.to == TrackerState::Down));
        assert_eq!(transitions[3].from, TrackerState::Down);
    }

    #[test]
    fn test_healthy_resets_count_and_recovers_once() {
        let mut tracker = FailureTracker::new();
        feed(&mut tracker, &[Outcome::Timeout; 4], 2);

        let transitions = feed(&mut tracker, &[Outcome::Healthy, Outcome::Healthy], 2);

        assert_eq!(transitions[0].from, TrackerState::Down);
        assert_eq!(transitions[0].event, Some(TrackerEvent::Recovered));
        assert_eq!(transitions[0].consecutive_failures, 0);
        assert_eq!(transitions[1].from, TrackerState::Healthy);
        assert_eq!(transitions[1].to, TrackerState::Healthy);
        assert_eq!(transitions[1].event, None);
    }

    #[test]
    fn test_recovered_from_below_threshold() {
        let mut tracker = FailureTracker::new();
        feed(&mut tracker, &[Outcome::Healthy, Outcome::Degraded], 3);

        let transition = tracker.advance(Outcome::Healthy, 3);

        assert_eq!(transition.from, TrackerState::Degraded(1));
        assert_eq!(transition.event, Some(TrackerEvent::Recovered));
    }

    #[test]
    fn test_first_healthy_result_recovers_from_unknown() {
        let mut tracker = FailureTracker::new();

        let transition = tracker.advance(Outcome::Healthy, 3);

        assert_eq!(transition.from, TrackerState::Unknown);
        assert_eq!(transition.event, Some(TrackerEvent::Recovered));
        assert_eq!(tracker.failure_state().was_online, Some(true));
    }

    #[test]
    fn test_threshold_of_one_and_zero() {
        let mut tracker = FailureTracker::new();
        let transitions = feed(&mut tracker, &[Outcome::Degraded, Outcome::Degraded], 1);
        assert_eq!(crossings(&transitions), vec![0, 1]);

        let mut tracker = FailureTracker::new();
        let transition = tracker.advance(Outcome::Degraded, 0);
        assert_eq!(transition.event, Some(TrackerEvent::ThresholdCrossed(Outcome::Degraded)));
    }

    #[test]
    fn test_failure_state_snapshot() {
        let mut tracker = FailureTracker::new();
        tracker.advance(Outcome::Healthy, 3);
        tracker.advance(Outcome::Timeout, 3);

        let snapshot = tracker.failure_state();
        assert_eq!(snapshot.consecutive_failures, 1);
        assert_eq!(snapshot.last_outcome, Some(Outcome::Timeout));
        assert_eq!(snapshot.was_online, Some(false));
    }

    #[test]
    fn test_degraded_twice_then_healthy() {
        let mut tracker = FailureTracker::new();
        let transitions = feed(&mut tracker, &[Outcome::Degraded, Outcome::Degraded, Outcome::Healthy], 2);

        assert_eq!(transitions[0].event, None);
        assert_eq!(transitions[1].event, Some(TrackerEvent::ThresholdCrossed(Outcome::Degraded)));
        assert_eq!(transitions[2].event, Some(TrackerEvent::Recovered));
    }
}
