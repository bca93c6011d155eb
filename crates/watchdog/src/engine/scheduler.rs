//! Monitor scheduler - the engine's control loop.
//!
//! One background task per scheduler runs ticks of
//! settings → probe → tracker → recovery → observer, then sleeps.
//! `start`/`stop`/`reload` only flip shared state and wake the task; they
//! never wait for an in-flight tick. Stopping is cooperative and takes
//! effect at the next tick boundary.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use super::log::{LogSink, TracingLog};
use super::notifier::{Notifier, NullNotifier};
use super::observer::{NullObserver, Observer, deliver};
use crate::error::{ConfigError, WatchdogError};
use crate::monitoring::{
    Checker, FailureState, FailureTracker, HealthCheckResult, HealthProbe, TrackerEvent, TrackerState,
    Transition,
};
use crate::recovery::{CommandResult, Dispatcher, RecoveryCategory, ShellDispatcher};
use crate::settings::{Settings, SettingsProvider};

/// Lifecycle of the monitor loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Idle,
    Running,
    /// Stop requested; the loop exits at the next tick boundary
    StopRequested,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Idle => write!(f, "idle"),
            Lifecycle::Running => write!(f, "running"),
            Lifecycle::StopRequested => write!(f, "stopping"),
        }
    }
}

/// Everything that happened during one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub result: HealthCheckResult,
    pub transition: Transition,
    /// Remediation category triggered by this tick, if any
    pub category: Option<RecoveryCategory>,
    pub commands: Vec<CommandResult>,
}

impl TickReport {
    /// One-line summary pushed to the observer
    pub fn summary(&self, failure_threshold: u32) -> String {
        let mut line = self.result.to_string();

        match self.transition.event {
            Some(TrackerEvent::Recovered) => line.push_str(" | recovered"),
            Some(TrackerEvent::ThresholdCrossed(_)) => line.push_str(&format!(
                " | {}/{} failures, threshold crossed",
                self.transition.consecutive_failures, failure_threshold
            )),
            None if !self.result.is_healthy() => line.push_str(&format!(
                " | {}/{} failures",
                self.transition.consecutive_failures, failure_threshold
            )),
            None => {}
        }

        if let Some(category) = self.category {
            let failed = self.commands.iter().filter(|c| !c.succeeded()).count();
            line.push_str(&format!("; {category} commands run: {}, failed: {failed}", self.commands.len()));
        }

        line
    }
}

/// Point-in-time view of the engine
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub lifecycle: Lifecycle,
    pub settings: Settings,
    pub tracker_state: TrackerState,
    pub failure_state: FailureState,
    pub last_tick: Option<TickReport>,
    pub ticks: u64,
}

/// State shared between the control surface and the loop
struct Control {
    lifecycle: Lifecycle,
    settings: Settings,
    tracker_state: TrackerState,
    failure_state: FailureState,
    last_tick: Option<TickReport>,
    ticks: u64,
}

struct Inner {
    control: Mutex<Control>,
    wake: Notify,
    lifecycle_tx: watch::Sender<Lifecycle>,
    provider: Arc<dyn SettingsProvider>,
    probe: HealthProbe,
    dispatcher: Arc<dyn Dispatcher>,
    observer: Arc<dyn Observer>,
    notifier: Arc<dyn Notifier>,
    log: Arc<dyn LogSink>,
}

/// Owns the monitor loop and its control surface
pub struct MonitorScheduler {
    inner: Arc<Inner>,
    runtime: Handle,
}

/// Builder for [`MonitorScheduler`]
pub struct MonitorSchedulerBuilder {
    provider: Arc<dyn SettingsProvider>,
    probe: Option<HealthProbe>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    observer: Option<Arc<dyn Observer>>,
    notifier: Option<Arc<dyn Notifier>>,
    log: Option<Arc<dyn LogSink>>,
    runtime: Option<Handle>,
}

impl MonitorSchedulerBuilder {
    /// Probe used for health checks (defaults to HTTP)
    pub fn probe(mut self, probe: HealthProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Shorthand for a probe around `checker`
    pub fn checker(self, checker: Arc<dyn Checker>) -> Self {
        self.probe(HealthProbe::new(checker))
    }

    /// Recovery dispatcher (defaults to the shell)
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Event log (defaults to `tracing`)
    pub fn log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    /// Runtime the loop is spawned on (defaults to the current one)
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the scheduler in the `Idle` state.
    ///
    /// Unreadable settings are not fatal here: the engine starts from
    /// defaults and picks the file up on the first successful tick.
    pub fn build(self) -> Result<MonitorScheduler, WatchdogError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| WatchdogError::NoRuntime)?,
        };
        let probe = match self.probe {
            Some(probe) => probe,
            None => HealthProbe::http()?,
        };

        let settings = match self.provider.load().and_then(Settings::validated) {
            Ok(settings) => settings,
            Err(error) => {
                warn!(%error, "Failed to load settings, starting from defaults");
                Settings::default()
            }
        };

        let (lifecycle_tx, _rx) = watch::channel(Lifecycle::Idle);
        let inner = Inner {
            control: Mutex::new(Control {
                lifecycle: Lifecycle::Idle,
                settings,
                tracker_state: TrackerState::Unknown,
                failure_state: FailureState::default(),
                last_tick: None,
                ticks: 0,
            }),
            wake: Notify::new(),
            lifecycle_tx,
            provider: self.provider,
            probe,
            dispatcher: self.dispatcher.unwrap_or_else(|| Arc::new(ShellDispatcher::new())),
            observer: self.observer.unwrap_or_else(|| Arc::new(NullObserver)),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(NullNotifier)),
            log: self.log.unwrap_or_else(|| Arc::new(TracingLog)),
        };

        Ok(MonitorScheduler { inner: Arc::new(inner), runtime })
    }
}

impl MonitorScheduler {
    pub fn builder(provider: Arc<dyn SettingsProvider>) -> MonitorSchedulerBuilder {
        MonitorSchedulerBuilder {
            provider,
            probe: None,
            dispatcher: None,
            observer: None,
            notifier: None,
            log: None,
            runtime: None,
        }
    }

    /// Scheduler with the default HTTP probe, shell dispatcher and collaborators
    pub fn new(provider: Arc<dyn SettingsProvider>) -> Result<Self, WatchdogError> {
        Self::builder(provider).build()
    }

    /// Start the loop. Returns `false` if it was already running.
    ///
    /// Starting while a stop is pending cancels the stop.
    pub fn start(&self) -> bool {
        let mut control = self.inner.lock();
        match control.lifecycle {
            Lifecycle::Running => {
                debug!("Monitor loop already running");
                false
            }
            Lifecycle::StopRequested => {
                control.lifecycle = Lifecycle::Running;
                self.inner.lifecycle_tx.send_replace(Lifecycle::Running);
                info!("Pending stop cancelled");
                true
            }
            Lifecycle::Idle => {
                control.lifecycle = Lifecycle::Running;
                self.inner.lifecycle_tx.send_replace(Lifecycle::Running);
                self.runtime.spawn(run_loop(Arc::clone(&self.inner)));
                true
            }
        }
    }

    /// Ask the loop to stop at the next tick boundary.
    ///
    /// Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        {
            let mut control = self.inner.lock();
            if control.lifecycle != Lifecycle::Running {
                return false;
            }
            control.lifecycle = Lifecycle::StopRequested;
            self.inner.lifecycle_tx.send_replace(Lifecycle::StopRequested);
        }
        info!("Stop requested");
        self.inner.wake.notify_one();
        true
    }

    /// Load settings now and make them the snapshot for the next tick.
    ///
    /// On failure the current settings stay in effect.
    pub fn reload(&self) -> Result<Settings, ConfigError> {
        match self.inner.provider.reload().and_then(Settings::validated) {
            Ok(settings) => {
                self.inner.lock().settings = settings.clone();
                self.inner.wake.notify_one();
                info!(target_url = %settings.target_url, "Settings reloaded");
                self.inner.log.append("Settings reloaded");
                Ok(settings)
            }
            Err(error) => {
                warn!(%error, "Settings reload failed, keeping previous settings");
                self.inner.log.append(&format!("Settings reload failed: {error}"));
                Err(error)
            }
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lock().lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    /// Settings the next tick falls back to
    pub fn settings(&self) -> Settings {
        self.inner.lock().settings.clone()
    }

    pub fn status(&self) -> EngineStatus {
        let control = self.inner.lock();
        EngineStatus {
            lifecycle: control.lifecycle,
            settings: control.settings.clone(),
            tracker_state: control.tracker_state,
            failure_state: control.failure_state,
            last_tick: control.last_tick.clone(),
            ticks: control.ticks,
        }
    }

    /// Watch lifecycle changes
    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.inner.lifecycle_tx.subscribe()
    }

    /// Resolve once the loop is idle
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|lifecycle| *lifecycle == Lifecycle::Idle).await;
    }
}

impl Drop for MonitorScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_lifecycle(&self, control: &mut Control, lifecycle: Lifecycle) {
        control.lifecycle = lifecycle;
        self.lifecycle_tx.send_replace(lifecycle);
    }

    /// Tick boundary: keep going, or settle into `Idle`
    fn begin_tick(&self) -> bool {
        let mut control = self.lock();
        if control.lifecycle == Lifecycle::Running {
            return true;
        }
        self.set_lifecycle(&mut control, Lifecycle::Idle);
        false
    }

    /// Fresh settings for this tick, or the last known-good ones
    fn refresh_settings(&self) -> Settings {
        match self.provider.load().and_then(Settings::validated) {
            Ok(settings) => {
                self.lock().settings = settings.clone();
                settings
            }
            Err(error) => {
                warn!(%error, "Failed to load settings, keeping last known-good");
                self.log.append(&format!("Settings unreadable, using previous settings: {error}"));
                self.lock().settings.clone()
            }
        }
    }

    fn emit(&self, line: &str) {
        deliver(self.observer.as_ref(), line);
        self.log.append(line);
    }

    fn notify(&self, title: &str, message: &str) {
        let notifier = self.notifier.as_ref();
        if std::panic::catch_unwind(AssertUnwindSafe(|| notifier.notify(title, message))).is_err() {
            warn!("Notifier panicked; ignoring");
        }
    }

    async fn tick(&self, settings: &Settings, tracker: &mut FailureTracker) -> TickReport {
        let timeout = settings.probe_timeout();
        let result = self
            .probe
            .check(&settings.target_url, settings.probe_attempts, timeout, settings.retry_delay())
            .await;
        let result = self.probe.confirm_connectivity(result, settings.connectivity_url.as_deref(), timeout).await;

        let transition = tracker.observe(&result, settings.failure_threshold);
        if let Some(error) = result.error() {
            debug!(%error, from = %transition.from, to = %transition.to, "Health check failed");
        }

        let category = match transition.event {
            Some(TrackerEvent::ThresholdCrossed(outcome)) => Some(RecoveryCategory::for_failure(outcome)),
            Some(TrackerEvent::Recovered) => Some(RecoveryCategory::Recovery),
            None => None,
        };

        let mut commands = Vec::new();
        if let Some(category) = category {
            if settings.notify {
                match category {
                    RecoveryCategory::Recovery => {
                        self.notify("Watchdog: recovered", &format!("{} is healthy again", result.target))
                    }
                    failure => self.notify(&format!("Watchdog: {failure}"), &result.to_string()),
                }
            }

            let actions = settings.recovery_actions(category);
            if actions.is_empty() {
                info!(%category, key = category.settings_key(), "No recovery commands configured");
            } else {
                info!(%category, count = actions.len(), "Dispatching recovery commands");
                commands = self.dispatcher.dispatch(category, &actions, settings.command_timeout()).await;
                for command in &commands {
                    self.emit(&command.to_string());
                }
            }
        }

        TickReport { result, transition, category, commands }
    }

    /// Publish the tracker after a tick; a tick that panicked has no report
    fn record(&self, tracker: &FailureTracker, report: Option<TickReport>) {
        let mut control = self.lock();
        control.tracker_state = tracker.state();
        control.failure_state = tracker.failure_state();
        if report.is_some() {
            control.last_tick = report;
        }
        control.ticks += 1;
    }

    /// Sleep `check_interval` from `from`, returning early on stop.
    ///
    /// Wake-ups re-read the interval so a reload applies to the pending sleep.
    async fn pause(&self, from: Instant) {
        loop {
            let (lifecycle, interval) = {
                let control = self.lock();
                (control.lifecycle, control.settings.check_interval())
            };
            if lifecycle != Lifecycle::Running {
                return;
            }

            let deadline = from.checked_add(interval).unwrap_or_else(far_future);
            if Instant::now() >= deadline {
                return;
            }

            tokio::select! {
                () = sleep_until(deadline) => return,
                () = self.wake.notified() => {}
            }
        }
    }
}

/// Deadline for intervals too large to represent, roughly 30 years out
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

/// Text of a panic payload
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Puts the engine back to `Idle` if the loop task dies mid-tick
struct LoopGuard {
    inner: Arc<Inner>,
    armed: bool,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        if self.armed {
            let mut control = self.inner.lock();
            self.inner.set_lifecycle(&mut control, Lifecycle::Idle);
        }
    }
}

async fn run_loop(inner: Arc<Inner>) {
    info!("Monitor loop started");
    inner.log.append("Monitor started");

    let mut guard = LoopGuard { inner: Arc::clone(&inner), armed: true };
    let mut tracker = FailureTracker::new();

    while inner.begin_tick() {
        let settings = inner.refresh_settings();

        let tick = AssertUnwindSafe(inner.tick(&settings, &mut tracker)).catch_unwind().await;
        match tick {
            Ok(report) => {
                inner.emit(&report.summary(settings.failure_threshold));
                inner.record(&tracker, Some(report));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%message, "Monitor tick panicked; continuing with the next tick");
                inner.emit(&format!("Check of {} failed unexpectedly: {message}", settings.target_url));
                inner.record(&tracker, None);
            }
        }

        inner.pause(Instant::now()).await;
    }

    guard.armed = false;
    info!("Monitor loop stopped");
    inner.log.append("Monitor stopped");
}
