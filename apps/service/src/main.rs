//! `watchdog` - command-line controller for the tunnel watchdog engine.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use logger::LogOptions;
use watchdog::{FileSettingsProvider, HealthProbe, SettingsProvider};

mod controller;
mod notifier;

/// Tunnel watchdog CLI
#[derive(Parser)]
#[command(name = "watchdog")]
#[command(about = "Health-check a tunnelled service and run repair commands when it fails", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (.toml or .json); defaults to the user config directory
    #[arg(short, long, global = true, env = "WATCHDOG_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Prefix diagnostic log lines with a timestamp
    #[arg(long, global = true)]
    log_time: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor loop in the foreground
    Run {
        /// Also append events to this file (rotated at 1 MiB)
        #[arg(long)]
        log_file: Option<PathBuf>,

        /// Disable desktop notifications regardless of settings
        #[arg(long)]
        no_notify: bool,
    },

    /// Run a single health check; exits 0 only when healthy
    Check {
        /// URL to check instead of the configured target
        #[arg(long)]
        url: Option<String>,
    },

    /// Inspect or create the settings file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective settings
    Show {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the settings file location
    Path,
    /// Write default settings if the file does not exist
    Init,
}

impl Cli {
    fn log_options(&self) -> LogOptions {
        LogOptions { with_time: self.log_time, ..LogOptions::from_verbosity(self.verbose) }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logger::init_with(cli.log_options());

    let provider = FileSettingsProvider::open(cli.config.as_deref()).context("Failed to open settings")?;

    match cli.command {
        Commands::Run { log_file, no_notify } => {
            controller::run(provider, log_file, no_notify).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { url } => check(&provider, url).await,
        Commands::Config { action } => {
            config(&provider, action)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn check(provider: &FileSettingsProvider, url: Option<String>) -> anyhow::Result<ExitCode> {
    let settings = provider.load().context("Failed to load settings")?;
    let url = url.unwrap_or_else(|| settings.target_url.clone());

    let probe = HealthProbe::http().context("Failed to build HTTP client")?;
    let result = probe
        .check(&url, settings.probe_attempts, settings.probe_timeout(), settings.retry_delay())
        .await;
    let result =
        probe.confirm_connectivity(result, settings.connectivity_url.as_deref(), settings.probe_timeout()).await;

    println!("{result}");
    Ok(if result.is_healthy() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn config(provider: &FileSettingsProvider, action: ConfigCommands) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Show { json } => {
            let settings = provider.load().context("Failed to load settings")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                println!("{settings}");
            }
        }
        ConfigCommands::Path => println!("{}", provider.path().display()),
        // opening the provider already wrote defaults if needed
        ConfigCommands::Init => println!("Settings file ready at {}", provider.path().display()),
    }
    Ok(())
}
