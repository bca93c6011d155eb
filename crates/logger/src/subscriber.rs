use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the diagnostic log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// Read the format from `RUST_LOG_FORMAT`, defaulting to compact output
    pub fn from_env() -> Self {
        let log_format = var("RUST_LOG_FORMAT")
            .inspect_err(|error| {
                warn!("Failed to read RUST_LOG_FORMAT, falling back to default: {error}")
            })
            .unwrap_or_default();

        Self::parse(&log_format)
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Options for [`init_with`]
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Level used when `RUST_LOG` does not say otherwise
    pub level: LevelFilter,
    pub format: LogFormat,
    /// Prefix compact lines with a timestamp
    pub with_time: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { level: LevelFilter::INFO, format: LogFormat::from_env(), with_time: false }
    }
}

impl LogOptions {
    /// Map a `-v` count to a default level (0 = warn, 1 = info, 2 = debug, 3+ = trace)
    pub fn from_verbosity(verbose: u8) -> Self {
        let level = match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        Self { level, ..Self::default() }
    }
}

pub fn init() {
    init_with(LogOptions::default());
}

/// Initialize the tracing subscriber on stderr.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with(options: LogOptions) {
    let env_filter =
        EnvFilter::builder().with_default_directive(options.level.into()).from_env_lossy();

    let log_layer = match options.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact if options.with_time => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
    };

    let _ = tracing_subscriber::registry().with(log_layer).try_init();
}
