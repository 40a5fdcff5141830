//! Runner for the Claude Code CLI.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{spawn_error, wait_with_cancellation, AgentError, AgentRequest, AgentRunner};
use crate::shutdown::ShutdownSignal;

/// Invokes `claude -p <prompt>`, with `--continue` on continuation.
/// Output is inherited so agent progress shows up in the supervisor's
/// own stdout.
pub struct ClaudeAgentRunner {
    command: String,
    extra_args: Vec<String>,
    shutdown: ShutdownSignal,
}

impl ClaudeAgentRunner {
    pub fn new(command: String, extra_args: Vec<String>, shutdown: ShutdownSignal) -> Self {
        Self {
            command,
            extra_args,
            shutdown,
        }
    }

    fn args(&self, request: &AgentRequest) -> Vec<String> {
        let mut args = Vec::new();
        if request.continue_session {
            args.push("--continue".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push("-p".to_string());
        args.push(request.prompt.clone());
        args
    }
}

#[async_trait]
impl AgentRunner for ClaudeAgentRunner {
    async fn run(&self, request: &AgentRequest) -> Result<(), AgentError> {
        let args = self.args(request);

        if request.dry_run {
            info!(
                command = %self.command,
                workdir = ?request.working_directory,
                continue_session = request.continue_session,
                "Dry run, skipping agent invocation"
            );
            return Ok(());
        }

        debug!(
            command = %self.command,
            workdir = ?request.working_directory,
            continue_session = request.continue_session,
            "Starting agent"
        );

        let child = tokio::process::Command::new(&self.command)
            .args(&args)
            .current_dir(&request.working_directory)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.command, e))?;

        wait_with_cancellation(child, &self.shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn request(dry_run: bool) -> AgentRequest {
        AgentRequest {
            prompt: "do the thing".to_string(),
            working_directory: PathBuf::from("."),
            continue_session: false,
            dry_run,
        }
    }

    #[test]
    fn continue_flag_precedes_the_prompt() {
        let runner = ClaudeAgentRunner::new(
            "claude".to_string(),
            vec!["--verbose".to_string()],
            ShutdownSignal::never(),
        );
        let mut req = request(false);
        req.continue_session = true;

        let args = runner.args(&req);
        assert_eq!(
            args,
            vec!["--continue", "--verbose", "-p", "do the thing"]
        );

        req.continue_session = false;
        let args = runner.args(&req);
        assert_eq!(args, vec!["--verbose", "-p", "do the thing"]);
    }

    #[tokio::test]
    async fn successful_exit_is_ok() {
        let runner = ClaudeAgentRunner::new("true".to_string(), vec![], ShutdownSignal::never());
        assert!(runner.run(&request(false)).await.is_ok());
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let runner = ClaudeAgentRunner::new("false".to_string(), vec![], ShutdownSignal::never());
        let err = runner.run(&request(false)).await.unwrap_err();
        assert!(matches!(err, AgentError::NonZeroExit { code: 1 }));
    }

    #[tokio::test]
    async fn missing_binary_is_classified() {
        let runner = ClaudeAgentRunner::new(
            "night-shift-no-such-agent".to_string(),
            vec![],
            ShutdownSignal::never(),
        );
        let err = runner.run(&request(false)).await.unwrap_err();
        assert!(matches!(err, AgentError::NotFound { .. }));
    }

    #[tokio::test]
    async fn dry_run_never_spawns() {
        let runner = ClaudeAgentRunner::new(
            "night-shift-no-such-agent".to_string(),
            vec![],
            ShutdownSignal::never(),
        );
        assert!(runner.run(&request(true)).await.is_ok());
    }

    #[tokio::test]
    async fn cancellation_kills_the_agent() {
        let coordinator = crate::shutdown::ShutdownCoordinator::new();
        // `sh -c "sleep 30"` ignores the trailing `-p <prompt>` args
        // (they become $0 and $1 of the script).
        let runner = ClaudeAgentRunner::new(
            "sh".to_string(),
            vec!["-c".to_string(), "sleep 30".to_string()],
            coordinator.signal(),
        );

        let handle = tokio::spawn(async move { runner.run(&request(false)).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("cancelled agent should return promptly")
            .unwrap();
        assert!(matches!(result.unwrap_err(), AgentError::Cancelled));
    }
}
