//! Logging setup shared by the watchdog crates.
//!
//! - `subscriber`: tracing subscriber for diagnostics on stderr
//! - `rotating`: size-bounded rotating file used by the event log

mod rotating;
mod subscriber;

pub use rotating::{DEFAULT_BACKUPS, DEFAULT_MAX_BYTES, RotatingFile, RotationPolicy};
pub use subscriber::{LogFormat, LogOptions, init, init_with};
