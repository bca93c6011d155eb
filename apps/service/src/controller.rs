//! Foreground controller: drives the engine from stdin and prints its events.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{info, warn};
use watchdog::{BroadcastObserver, EngineStatus, FileLog, FileSettingsProvider, MonitorScheduler};

use crate::notifier::DesktopNotifier;

const HELP: &str = "Commands: start, stop, reload, status, help, quit";

/// A line typed on the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleCommand {
    Start,
    Stop,
    Reload,
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "reload" => Some(Self::Reload),
            "status" => Some(Self::Status),
            "help" | "?" => Some(Self::Help),
            "quit" | "exit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

pub async fn run(provider: FileSettingsProvider, log_file: Option<PathBuf>, no_notify: bool) -> anyhow::Result<()> {
    info!(path = %provider.path().display(), "Using settings file");

    let observer = Arc::new(BroadcastObserver::default());
    let mut builder = MonitorScheduler::builder(Arc::new(provider)).observer(observer.clone());
    if let Some(path) = log_file {
        let log = FileLog::open(&path).with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder = builder.log(Arc::new(log));
    }
    if !no_notify {
        builder = builder.notifier(Arc::new(DesktopNotifier::new()));
    }
    let scheduler = builder.build().context("Failed to start the watchdog engine")?;

    let mut events = observer.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(line) => println!("{line}"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Console fell behind, events dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    scheduler.start();
    println!("{HELP}");

    let mut lines = spawn_line_reader(io::BufReader::new(io::stdin())).context("Failed to read stdin")?;
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.recv(), if stdin_open => {
                let Some(line) = line.transpose().context("Failed to read stdin")? else {
                    // detached from a terminal: keep monitoring until interrupted
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match ConsoleCommand::parse(&line) {
                    Some(ConsoleCommand::Quit) => break,
                    Some(command) => handle(&scheduler, command),
                    None => println!("Unknown command `{}`. {HELP}", line.trim()),
                }
            }
        }
    }

    shutdown(&scheduler).await;
    Ok(())
}

/// Read lines on a plain thread and hand them to the runtime.
///
/// A blocked read never holds up runtime shutdown; the thread simply dies
/// with the process.
fn spawn_line_reader<R>(reader: R) -> io::Result<mpsc::Receiver<io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    thread::Builder::new().name("console-input".into()).spawn(move || {
        for line in reader.lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    })?;
    Ok(rx)
}

fn handle(scheduler: &MonitorScheduler, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Start => {
            if scheduler.start() {
                println!("Monitor started");
            } else {
                println!("Monitor already running");
            }
        }
        ConsoleCommand::Stop => {
            if scheduler.stop() {
                println!("Monitor stopping after the current check");
            } else {
                println!("Monitor is not running");
            }
        }
        ConsoleCommand::Reload => match scheduler.reload() {
            Ok(settings) => println!("Settings reloaded\n{settings}"),
            Err(error) => println!("Reload failed, keeping previous settings: {error}"),
        },
        ConsoleCommand::Status => print_status(&scheduler.status()),
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => {}
    }
}

fn print_status(status: &EngineStatus) {
    println!("Monitor: {}", status.lifecycle);
    println!(
        "State: {} ({} consecutive failures)",
        status.tracker_state, status.failure_state.consecutive_failures
    );
    println!("Checks run: {}", status.ticks);
    if let Some(tick) = &status.last_tick {
        println!("Last check: {}", tick.result);
    }
    println!("{}", status.settings);
}

/// Stop and wait for the in-flight check; a second Ctrl-C abandons it
async fn shutdown(scheduler: &MonitorScheduler) {
    if scheduler.stop() {
        println!("Waiting for the current check to finish (Ctrl-C again to abort)");
    }
    tokio::select! {
        () = scheduler.wait_idle() => info!("Monitor stopped"),
        _ = tokio::signal::ctrl_c() => warn!("Aborting in-flight check"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_console_commands() {
        assert_eq!(ConsoleCommand::parse("start"), Some(ConsoleCommand::Start));
        assert_eq!(ConsoleCommand::parse("  STOP \n"), Some(ConsoleCommand::Stop));
        assert_eq!(ConsoleCommand::parse("reload"), Some(ConsoleCommand::Reload));
        assert_eq!(ConsoleCommand::parse("status"), Some(ConsoleCommand::Status));
        assert_eq!(ConsoleCommand::parse("?"), Some(ConsoleCommand::Help));
        assert_eq!(ConsoleCommand::parse("exit"), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("restart"), None);
    }

    #[tokio::test]
    async fn test_line_reader_forwards_lines_until_eof() {
        let mut lines = spawn_line_reader(io::Cursor::new("status\nquit\n")).unwrap();

        assert_eq!(lines.recv().await.unwrap().unwrap(), "status");
        assert_eq!(lines.recv().await.unwrap().unwrap(), "quit");
        assert!(lines.recv().await.is_none());
    }

    /// Reader that never returns, like a terminal nobody types into
    struct Stalled;

    impl io::Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            loop {
                thread::park();
            }
        }
    }

    #[test]
    fn test_stalled_input_does_not_block_runtime_shutdown() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let lines = runtime.block_on(async { spawn_line_reader(io::BufReader::new(Stalled)) }).unwrap();

        let started = std::time::Instant::now();
        drop(runtime);
        drop(lines);

        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_handle_stop_and_reload_while_idle() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSettingsProvider::open(Some(dir.path().join("settings.toml"))).unwrap();
        let scheduler = MonitorScheduler::new(Arc::new(provider)).unwrap();

        handle(&scheduler, ConsoleCommand::Stop);
        assert!(!scheduler.is_running());

        handle(&scheduler, ConsoleCommand::Reload);
        assert_eq!(scheduler.settings().target_url, "https://example.com");
    }
}
