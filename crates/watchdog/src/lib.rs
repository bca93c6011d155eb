//! Health-check and self-repair engine for tunnelled services.
//!
//! A [`MonitorScheduler`] periodically probes a target URL, tracks
//! consecutive failures and runs configured shell commands when the
//! failure threshold is crossed or the target recovers.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use watchdog::{FileSettingsProvider, MonitorScheduler};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = FileSettingsProvider::open(None::<&str>)?;
//! let scheduler = MonitorScheduler::new(Arc::new(provider))?;
//! scheduler.start();
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod monitoring;
pub mod recovery;
pub mod settings;

pub use engine::{
    BroadcastObserver, EngineStatus, FileLog, Lifecycle, LogSink, MonitorScheduler, MonitorSchedulerBuilder,
    Notifier, NullNotifier, NullObserver, Observer, TickReport, TracingLog,
};
pub use error::{CommandError, ConfigError, ProbeError, WatchdogError};
pub use monitoring::{
    Checker, FailureState, FailureTracker, HealthCheckResult, HealthProbe, HttpChecker, Outcome, TrackerEvent,
    TrackerState, Transition,
};
pub use recovery::{CommandResult, Dispatcher, RecoveryAction, RecoveryCategory, ShellDispatcher};
pub use settings::{FileSettingsProvider, Settings, SettingsFormat, SettingsProvider, default_settings_path};
