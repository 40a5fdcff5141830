//! Base command execution abstraction.
//!
//! Everything that shells out (git, the agent CLI) goes through
//! [`CommandExecutor`], so subprocesses are mockable in tests and die
//! promptly when shutdown is requested.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::shutdown::ShutdownSignal;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }
}

#[derive(Debug, Error, Clone)]
pub enum CommandError {
    #[error("command not found: {command}")]
    CommandNotFound { command: String },
    #[error("command cancelled by shutdown")]
    Cancelled,
    #[error("IO error: {message}")]
    Io { message: String },
}

/// Trait for executing external commands.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, CommandError>;
}

/// Real implementation using `tokio::process`. The child is spawned
/// with `kill_on_drop`, so losing the race against the shutdown signal
/// terminates it.
pub struct ProcessCommandExecutor {
    shutdown: ShutdownSignal,
}

impl ProcessCommandExecutor {
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl CommandExecutor for ProcessCommandExecutor {
    async fn execute(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, CommandError> {
        debug!(program, ?args, ?cwd, "Executing subprocess");

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CommandError::CommandNotFound {
                    command: program.to_string(),
                }
            } else {
                CommandError::Io {
                    message: e.to_string(),
                }
            }
        })?;

        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.map_err(|e| CommandError::Io { message: e.to_string() })?
            }
            _ = self.shutdown.cancelled() => {
                warn!(program, "Subprocess cancelled by shutdown");
                return Err(CommandError::Cancelled);
            }
        };

        Ok(CommandOutput {
            status_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownCoordinator;

    #[tokio::test]
    async fn executes_and_captures_stdout() {
        let executor = ProcessCommandExecutor::new(ShutdownSignal::never());
        let output = executor.execute("echo", &["hello"], None).await.unwrap();

        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn missing_command_is_classified() {
        let executor = ProcessCommandExecutor::new(ShutdownSignal::never());
        let result = executor
            .execute("nonexistent_command_xyz", &[], None)
            .await;

        assert!(matches!(
            result.unwrap_err(),
            CommandError::CommandNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn respects_working_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let executor = ProcessCommandExecutor::new(ShutdownSignal::never());
        let output = executor
            .execute("pwd", &[], Some(dir.path()))
            .await
            .unwrap();

        let canonical = dir.path().canonicalize().unwrap();
        assert_eq!(output.stdout.trim(), canonical.to_string_lossy());
    }

    #[tokio::test]
    async fn cancellation_terminates_the_child() {
        let coordinator = ShutdownCoordinator::new();
        let executor = ProcessCommandExecutor::new(coordinator.signal());

        let handle = tokio::spawn(async move {
            executor.execute("sleep", &["30"], None).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        coordinator.shutdown();

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("cancelled subprocess should return promptly")
            .unwrap();
        assert!(matches!(result.unwrap_err(), CommandError::Cancelled));
    }
}
