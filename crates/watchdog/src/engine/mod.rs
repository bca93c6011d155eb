/// Engine module - the monitor loop and the collaborators it reports to
///
/// This module is responsible for:
/// - Scheduling ticks and owning the start/stop/reload lifecycle (`scheduler`)
/// - Pushing event lines to front ends (`observer`)
/// - Best-effort user notifications (`notifier`)
/// - The append-only event log (`log`)
pub mod log;
pub mod notifier;
pub mod observer;
pub mod scheduler;

pub use log::{FileLog, LogSink, TracingLog};
pub use notifier::{Notifier, NullNotifier};
pub use observer::{BroadcastObserver, NullObserver, Observer};
pub use scheduler::{EngineStatus, Lifecycle, MonitorScheduler, MonitorSchedulerBuilder, TickReport};
