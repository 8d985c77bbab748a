//! # Runbook Executor
//!
//! Runs a [`RunbookAction`] against the process manager and reports how it
//! exited. A non-zero exit is an ordinary [`ExecutionResult`]; only failing
//! to run the command at all, or running past the time bound, is an
//! [`ExecutionError`]. Neither is retried or escalated.
//!
//! A run ends when the process exits. Background processes it started may
//! keep stdout/stderr open; their output is abandoned shortly after exit.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::action::RunbookAction;
use crate::config::RunbookConfig;

/// Bytes of stdout/stderr kept for the log line
const OUTPUT_TAIL_BYTES: usize = 2048;

/// How long output is still read after the command exits
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Outcome of one remediation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Process exit code; `-1` when the process was killed by a signal
    pub exit_status: i32,
    pub succeeded: bool,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn from_exit_status(exit_status: i32, duration: Duration) -> Self {
        Self {
            exit_status,
            succeeded: exit_status == 0,
            duration,
        }
    }
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Failed to spawn '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("Remediation for '{target}' timed out after {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },

    #[error("Failed waiting on '{program}': {message}")]
    Wait { program: String, message: String },
}

/// Executes remediation actions
#[async_trait]
pub trait RunbookExecutor: Send + Sync {
    /// Run the action to completion
    ///
    /// Blocks the caller for the whole run; the consumer loop pulls no other
    /// message until this returns.
    async fn execute(&self, action: &RunbookAction) -> Result<ExecutionResult, ExecutionError>;
}

/// Spawns the action's argument vector directly, without a shell
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl ProcessExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn from_config(config: &RunbookConfig) -> Self {
        let executor = Self::new(config.timeout());
        match &config.working_dir {
            Some(dir) => executor.with_working_dir(dir),
            None => executor,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl RunbookExecutor for ProcessExecutor {
    async fn execute(&self, action: &RunbookAction) -> Result<ExecutionResult, ExecutionError> {
        let started = Instant::now();

        let mut command = Command::new(action.program());
        command
            .args(action.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out child is dropped here and must not outlive it
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(
            target_service = %action.target,
            command = %action.command_line(),
            timeout_ms = self.timeout.as_millis() as u64,
            "Spawning remediation command"
        );

        let mut child = command.spawn().map_err(|e| ExecutionError::Spawn {
            program: action.program(),
            message: e.to_string(),
        })?;

        let stdout = tokio::spawn(read_tail(child.stdout.take()));
        let stderr = tokio::spawn(read_tail(child.stderr.take()));

        let status = match timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                stdout.abort();
                stderr.abort();
                return Err(ExecutionError::Wait {
                    program: action.program(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                stdout.abort();
                stderr.abort();
                return Err(ExecutionError::Timeout {
                    target: action.target.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        let stdout = collect_output(stdout).await;
        let stderr = collect_output(stderr).await;

        let result = ExecutionResult::from_exit_status(
            status.code().unwrap_or(-1),
            started.elapsed(),
        );

        if result.succeeded {
            info!(
                target_service = %action.target,
                exit_status = result.exit_status,
                duration_ms = result.duration.as_millis() as u64,
                stdout = %output_tail(&stdout),
                "Remediation command succeeded"
            );
        } else {
            warn!(
                target_service = %action.target,
                exit_status = result.exit_status,
                duration_ms = result.duration.as_millis() as u64,
                stderr = %output_tail(&stderr),
                "Remediation command exited non-zero"
            );
        }

        Ok(result)
    }
}

/// Read a child pipe to EOF, keeping only the most recent output
async fn read_tail<R>(pipe: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Vec::new();
    };
    let mut kept = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                kept.extend_from_slice(&chunk[..n]);
                if kept.len() > 2 * OUTPUT_TAIL_BYTES {
                    kept.drain(..kept.len() - OUTPUT_TAIL_BYTES);
                }
            }
        }
    }
    kept
}

/// Output of a pipe reader once the command has exited
///
/// A background process the command left behind can hold the pipe open
/// indefinitely; after `OUTPUT_DRAIN_GRACE` the reader is abandoned and its
/// output dropped.
async fn collect_output(reader: JoinHandle<Vec<u8>>) -> Vec<u8> {
    let abort = reader.abort_handle();
    match timeout(OUTPUT_DRAIN_GRACE, reader).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            abort.abort();
            Vec::new()
        }
    }
}

/// Last `OUTPUT_TAIL_BYTES` of a stream, trimmed
fn output_tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_end();
    if text.len() <= OUTPUT_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - OUTPUT_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runbook::{CommandTemplate, ServiceIdentifier};

    fn action(template: CommandTemplate, target: &str) -> RunbookAction {
        RunbookAction::restart(ServiceIdentifier::new(target).unwrap(), template)
    }

    fn sh(script: &str) -> CommandTemplate {
        // `sh -c script {service}` binds the target to $0
        CommandTemplate::new("sh", ["-c", script, "{service}"])
    }

    #[test]
    fn test_output_tail_truncates_on_char_boundary() {
        let long = "é".repeat(OUTPUT_TAIL_BYTES);
        let tail = output_tail(long.as_bytes());
        assert!(tail.starts_with("..."));
        assert!(tail.len() <= OUTPUT_TAIL_BYTES + 4);
        assert_eq!(output_tail(b"short\n"), "short");
    }

    #[tokio::test]
    async fn test_read_tail_keeps_recent_output() {
        let data = "x".repeat(10 * OUTPUT_TAIL_BYTES) + "end";
        let kept = read_tail(Some(data.as_bytes())).await;
        assert!(kept.len() <= 2 * OUTPUT_TAIL_BYTES);
        assert!(kept.ends_with(b"end"));

        assert!(read_tail(None::<&[u8]>).await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_succeeds() {
        let executor = ProcessExecutor::new(Duration::from_secs(5));
        let result = executor
            .execute(&action(sh("exit 0"), "payment-service"))
            .await
            .unwrap();
        assert_eq!(result.exit_status, 0);
        assert!(result.succeeded);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_a_result_not_an_error() {
        let executor = ProcessExecutor::new(Duration::from_secs(5));
        let result = executor
            .execute(&action(sh("exit 3"), "payment-service"))
            .await
            .unwrap();
        assert_eq!(result.exit_status, 3);
        assert!(!result.succeeded);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_target_is_passed_without_shell_interpretation() {
        let executor = ProcessExecutor::new(Duration::from_secs(5));
        let target = "web; exit 7";
        let script = format!("[ \"$0\" = '{target}' ]");
        let result = executor.execute(&action(sh(&script), target)).await.unwrap();
        assert!(result.succeeded, "target should arrive as one literal argument");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_hung_command() {
        let executor = ProcessExecutor::new(Duration::from_millis(100));
        let started = Instant::now();
        let result = executor.execute(&action(sh("sleep 5"), "hung-service")).await;

        assert!(matches!(result, Err(ExecutionError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_process_holding_pipes_does_not_block() {
        let executor = ProcessExecutor::new(Duration::from_secs(3));
        let started = Instant::now();
        let result = executor
            .execute(&action(sh("echo restarted; sleep 10 & exit 0"), "payment-service"))
            .await
            .unwrap();

        assert!(result.succeeded);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_larger_than_pipe_buffer_is_drained() {
        let executor = ProcessExecutor::new(Duration::from_secs(10));
        let script = "i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done; exit 1";
        let result = executor
            .execute(&action(sh(script), "payment-service"))
            .await
            .unwrap();
        assert_eq!(result.exit_status, 1);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let executor = ProcessExecutor::new(Duration::from_secs(5));
        let template = CommandTemplate::new("/nonexistent/process-manager", ["restart"]);
        let result = executor.execute(&action(template, "payment-service")).await;
        assert!(matches!(result, Err(ExecutionError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_working_dir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("compose.yaml"), "services: {}\n").unwrap();

        let executor = ProcessExecutor::new(Duration::from_secs(5)).with_working_dir(dir.path());
        let result = executor
            .execute(&action(sh("test -f compose.yaml"), "payment-service"))
            .await
            .unwrap();
        assert!(result.succeeded);
    }
}
