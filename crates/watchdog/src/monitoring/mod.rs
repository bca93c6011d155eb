/// Monitoring module - health probing and failure tracking
///
/// This module is responsible for:
/// - Executing single HTTP checks (`checker`)
/// - Retrying them into one check cycle (`probe`)
/// - Turning results into threshold/recovery transitions (`tracker`)
pub mod checker;
pub mod probe;
pub mod tracker;
pub mod types;

pub use checker::{Checker, HttpChecker};
pub use probe::HealthProbe;
pub use tracker::{FailureState, FailureTracker, TrackerEvent, TrackerState, Transition};
pub use types::{HealthCheckResult, Outcome};
