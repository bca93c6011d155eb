//! Runs recovery commands through the platform shell.
//!
//! Commands run one after another in list order. A failing command never
//! stops the ones after it: remediation lists usually chain independent
//! repair steps.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::types::{CommandResult, RecoveryAction, RecoveryCategory};
use crate::error::CommandError;

/// Executes categorized recovery commands
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    /// Run `commands` in order, continuing past failures; each one is
    /// bounded by `limit`
    async fn dispatch(
        &self,
        category: RecoveryCategory,
        commands: &[RecoveryAction],
        limit: Duration,
    ) -> Vec<CommandResult>;
}

/// Dispatcher running each command via `sh -c` (or `cmd /C` on Windows)
#[derive(Debug, Clone, Default)]
pub struct ShellDispatcher;

impl ShellDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Run one command, capturing its output
    pub async fn run(&self, action: &RecoveryAction, limit: Duration) -> CommandResult {
        let started = Instant::now();
        let finish = |exit_code, stdout, stderr, error| CommandResult {
            action: action.clone(),
            exit_code,
            stdout,
            stderr,
            elapsed: started.elapsed(),
            error,
        };

        let child = Command::from(shell_command(&action.command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                let error = CommandError::Spawn { command: action.command.clone(), reason: e.to_string() };
                return finish(None, String::new(), String::new(), Some(error));
            }
        };

        // Dropping the future on timeout drops the child, which kills the
        // shell; whatever it started is killed through its process group.
        let pid = child.id();
        match timeout(limit, child.wait_with_output()).await {
            Err(_) => {
                kill_process_group(pid);
                let error = CommandError::TimedOut { command: action.command.clone(), timeout: limit };
                finish(None, String::new(), String::new(), Some(error))
            }
            Ok(Err(e)) => {
                let error = CommandError::Spawn { command: action.command.clone(), reason: e.to_string() };
                finish(None, String::new(), String::new(), Some(error))
            }
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                let code = output.status.code();
                let error = (!output.status.success())
                    .then(|| CommandError::NonZeroExit { command: action.command.clone(), code });
                finish(code, stdout, stderr, error)
            }
        }
    }
}

#[async_trait::async_trait]
impl Dispatcher for ShellDispatcher {
    async fn dispatch(
        &self,
        category: RecoveryCategory,
        commands: &[RecoveryAction],
        limit: Duration,
    ) -> Vec<CommandResult> {
        let mut results = Vec::with_capacity(commands.len());

        for (index, action) in commands.iter().enumerate() {
            info!(
                %category,
                step = index + 1,
                total = commands.len(),
                command = %action.command,
                "Running recovery command"
            );
            let result = self.run(action, limit).await;

            match &result.error {
                None => info!(
                    %category,
                    command = %action.command,
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    "Recovery command succeeded"
                ),
                Some(error) => warn!(%category, %error, "Recovery command failed, continuing"),
            }
            results.push(result);
        }

        results
    }
}

/// `sh -c` in a process group of its own
#[cfg(unix)]
fn shell_command(command: &str) -> std::process::Command {
    use std::os::unix::process::CommandExt;

    let mut cmd = std::process::Command::new("sh");
    cmd.arg("-c").arg(command).process_group(0);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> std::process::Command {
    let mut cmd = std::process::Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Kill everything left in the group led by `pid`
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created for this command
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "Process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
