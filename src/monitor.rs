//! The top-level scheduler: poll on an interval, keep working the
//! current item until it resolves, otherwise select the best pending
//! item and hand it to the agent.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::agent::{AgentError, AgentRequest, AgentRunner};
use crate::github::{GitHubError, GitHubOps};
use crate::prioritizer;
use crate::prompt;
use crate::resolution::{self, ResolutionOutcome};
use crate::shutdown::ShutdownSignal;
use crate::state::{StateError, StateStore};
use crate::telemetry;
use crate::workitem::ProcessingItem;
use crate::workspace::{WorkspaceError, WorkspaceOps};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub check_interval: Duration,
    pub max_attempts: u32,
    pub dry_run: bool,
    /// Operator text appended to every agent prompt.
    pub agent_prompt: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            max_attempts: 3,
            dry_run: false,
            agent_prompt: String::new(),
        }
    }
}

/// Unrecoverable startup failure; the process exits non-zero.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to authenticate with GitHub: {0}")]
    Startup(#[source] GitHubError),
}

/// Errors caught at the tick boundary. Only cancellation leaves the
/// loop; everything else is logged and the next tick retries.
#[derive(Debug, Error)]
enum TickError {
    #[error(transparent)]
    Gateway(GitHubError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("tick cancelled")]
    Cancelled,
}

impl From<GitHubError> for TickError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Cancelled => TickError::Cancelled,
            other => TickError::Gateway(other),
        }
    }
}

pub struct Monitor {
    gateway: Arc<dyn GitHubOps>,
    workspace: Arc<dyn WorkspaceOps>,
    agent: Arc<dyn AgentRunner>,
    state: Arc<StateStore>,
    config: MonitorConfig,
    shutdown: ShutdownSignal,
}

impl Monitor {
    pub fn new(
        gateway: Arc<dyn GitHubOps>,
        workspace: Arc<dyn WorkspaceOps>,
        agent: Arc<dyn AgentRunner>,
        state: Arc<StateStore>,
        config: MonitorConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            gateway,
            workspace,
            agent,
            state,
            config,
            shutdown,
        }
    }

    /// Authenticate, then tick immediately and on every interval until
    /// shutdown. Ticks never overlap: an overrunning `process` delays
    /// the next tick, which then fires immediately.
    pub async fn run(&self) -> Result<(), MonitorError> {
        let username = match self.gateway.authenticated_user().await {
            Ok(username) => username,
            Err(GitHubError::Cancelled) => return Ok(()),
            Err(e) => return Err(MonitorError::Startup(e)),
        };

        if let Some(current) = self.state.current_item() {
            info!(
                kind = %current.item.kind,
                number = current.item.number,
                repository = %current.item.repository,
                attempts = current.attempt_count,
                "Resuming in-flight item from persisted state"
            );
        }
        info!(username = %username, interval_secs = self.config.check_interval.as_secs(), "Monitoring started");

        let mut interval = tokio::time::interval(self.config.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            self.run_once(&username).await;

            if self.shutdown.is_cancelled() {
                break;
            }
        }

        info!("Monitoring stopped");
        Ok(())
    }

    /// One tick, with errors handled at the boundary. Public so the
    /// `--once` mode and the integration tests can drive single cycles.
    pub async fn run_once(&self, username: &str) {
        let correlation_id = telemetry::generate_correlation_id();
        let span = info_span!("tick", correlation_id = %correlation_id);

        match self.tick(username).instrument(span).await {
            Ok(()) => {}
            Err(TickError::Cancelled) => {
                debug!("Tick cancelled by shutdown");
            }
            Err(TickError::Gateway(e)) if e.is_auth() => {
                error!(error = %e, "Authentication rejected, skipping tick");
            }
            Err(TickError::Gateway(e)) => {
                warn!(error = %e, transient = e.is_transient(), "Gateway error, skipping tick");
            }
            Err(TickError::State(e)) => {
                error!(error = %e, "State persistence error");
            }
        }
    }

    async fn tick(&self, username: &str) -> Result<(), TickError> {
        self.state.cleanup_old_failures().await?;

        if let Some(current) = self.state.current_item() {
            let snapshot = self.gateway.pending_items(username).await?;
            match resolution::check(&current, &snapshot) {
                ResolutionOutcome::ItemNotFound => {
                    info!(
                        kind = %current.item.kind,
                        number = current.item.number,
                        repository = %current.item.repository,
                        attempts = current.attempt_count,
                        outcome = "resolved",
                        "In-flight item is no longer pending"
                    );
                    self.state.clear_current().await?;
                    // Fall through and pick the next item this tick.
                }
                outcome => {
                    if outcome == ResolutionOutcome::ItemChanged {
                        debug!(
                            kind = %current.item.kind,
                            number = current.item.number,
                            "Item changed upstream, continuing anyway"
                        );
                    }
                    return self.process(current, true).await;
                }
            }
        }

        self.select_and_process(username).await
    }

    async fn select_and_process(&self, username: &str) -> Result<(), TickError> {
        let snapshot = self.gateway.pending_items(username).await?;
        if snapshot.is_empty() {
            debug!("Nothing pending, staying idle");
            return Ok(());
        }

        let view = self.state.view();
        let selected = match prioritizer::select_next(&snapshot, &view, Utc::now()) {
            Some(selected) => selected,
            None => {
                debug!(
                    pending = snapshot.count(),
                    "All candidates in cooldown, staying idle"
                );
                return Ok(());
            }
        };

        info!(
            kind = %selected.item.kind,
            number = selected.item.number,
            repository = %selected.item.repository,
            score = selected.score,
            reason = %selected.reason,
            "Selected work item"
        );

        let current = ProcessingItem::begin(selected.item, Utc::now());
        self.state.set_current(current.clone()).await?;
        self.process(current, false).await
    }

    /// Work `item` for one attempt. `item` is the record as of the
    /// start of this tick; the attempt ceiling checks that
    /// pre-increment count, so with the default ceiling of 3 the third
    /// failed attempt is the one that abandons.
    async fn process(&self, item: ProcessingItem, continue_mode: bool) -> Result<(), TickError> {
        if let Err(e) = self.prepare_workspace(&item, continue_mode).await {
            if matches!(e, WorkspaceError::Cancelled) {
                return Err(TickError::Cancelled);
            }
            warn!(
                repository = %item.item.repository,
                error = %e,
                "Workspace setup failed, counting as a failed attempt"
            );
            self.state.increment_attempt().await?;
            return self.handle_attempt_failure(&item).await;
        }

        let prompt_text = prompt::build(&item, continue_mode, &self.config.agent_prompt);
        self.state.increment_attempt().await?;

        let request = AgentRequest {
            prompt: prompt_text,
            working_directory: self.workspace.working_directory(&item.item.repository),
            continue_session: continue_mode,
            dry_run: self.config.dry_run,
        };

        match self.agent.run(&request).await {
            Ok(()) => {
                // Agent success only means "no error". The item stays
                // current; the next tick's resolution check decides
                // whether it is actually done.
                info!(
                    kind = %item.item.kind,
                    number = item.item.number,
                    repository = %item.item.repository,
                    attempt = item.attempt_count,
                    outcome = "agent_success",
                    "Agent completed"
                );
                Ok(())
            }
            Err(AgentError::Cancelled) => Err(TickError::Cancelled),
            Err(e) => {
                warn!(
                    kind = %item.item.kind,
                    number = item.item.number,
                    repository = %item.item.repository,
                    attempt = item.attempt_count,
                    error = %e,
                    outcome = "agent_failure",
                    "Agent failed"
                );
                self.handle_attempt_failure(&item).await
            }
        }
    }

    async fn prepare_workspace(
        &self,
        item: &ProcessingItem,
        continue_mode: bool,
    ) -> Result<(), WorkspaceError> {
        let repo = &item.item.repository;
        self.workspace.ensure_repository(repo).await?;

        // A continuation keeps whatever the previous attempt left in
        // the tree; only a fresh item gets reset.
        if !continue_mode {
            let branch = match self.gateway.default_branch(repo).await {
                Ok(branch) => branch,
                Err(GitHubError::Cancelled) => return Err(WorkspaceError::Cancelled),
                Err(e) => {
                    warn!(repository = %repo, error = %e, "Could not determine default branch, falling back to main");
                    "main".to_string()
                }
            };
            self.workspace.switch_to_main(repo, &branch).await?;
        }
        Ok(())
    }

    async fn handle_attempt_failure(&self, item: &ProcessingItem) -> Result<(), TickError> {
        if item.attempt_count >= self.config.max_attempts {
            let key = item.key();
            warn!(
                key = %key,
                attempts = item.attempt_count,
                outcome = "abandoned",
                "Attempt ceiling reached, abandoning item"
            );
            self.state.record_failure(&key).await?;
            self.state.clear_current().await?;
        } else {
            debug!(
                key = %item.key(),
                attempts = item.attempt_count,
                "Leaving item in flight for retry on a later tick"
            );
        }
        Ok(())
    }
}
