use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use night_shift::agent;
use night_shift::config::NightShiftConfig;
use night_shift::external::{CommandExecutor, ProcessCommandExecutor};
use night_shift::github::{GitHubClient, GitHubOps};
use night_shift::monitor::{Monitor, MonitorConfig};
use night_shift::shutdown::ShutdownCoordinator;
use night_shift::state::StateStore;
use night_shift::telemetry::init_telemetry;
use night_shift::workspace::{LocalWorkspace, WorkspaceOps};

#[derive(Parser)]
#[command(
    name = "night-shift",
    about = "Watches your pending GitHub work and drives an AI agent to clear it, one item at a time"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor loop
    Run {
        /// Run a single poll cycle and exit
        #[arg(long)]
        once: bool,
        /// Log agent invocations without executing them
        #[arg(long)]
        dry_run: bool,
        /// Seconds between polls (overrides configuration)
        #[arg(long)]
        check_interval: Option<u64>,
        /// Attempts per item before abandonment (overrides configuration)
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Extra instructions appended to every agent prompt
        #[arg(long)]
        agent_prompt: Option<String>,
    },
    /// Show the persisted processing state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    NightShiftConfig::load_env_file();
    let cli = Cli::parse();

    let mut config = NightShiftConfig::load().context("configuration is unusable")?;
    init_telemetry(&config.observability)?;

    match cli.command {
        Commands::Run {
            once,
            dry_run,
            check_interval,
            max_attempts,
            agent_prompt,
        } => {
            if dry_run {
                config.agent.dry_run = true;
            }
            if let Some(secs) = check_interval {
                config.monitor.check_interval_seconds = secs;
            }
            if let Some(attempts) = max_attempts {
                config.monitor.max_attempts = attempts;
            }
            if let Some(prompt) = agent_prompt {
                config.agent.prompt = prompt;
            }
            config.validate()?;

            run_monitor(config, once).await
        }
        Commands::Status => show_status(config).await,
    }
}

async fn run_monitor(config: NightShiftConfig, once: bool) -> Result<()> {
    let coordinator = ShutdownCoordinator::new();
    coordinator.install_signal_handlers()?;
    let shutdown = coordinator.signal();

    let token = config.github.token.clone().ok_or_else(|| {
        anyhow!("GitHub token not configured; set GITHUB_TOKEN or github.token in night-shift.toml")
    })?;

    let gateway: Arc<dyn GitHubOps> = Arc::new(GitHubClient::new(
        token,
        config.repo_filter()?,
        shutdown.clone(),
    )?);
    let executor: Arc<dyn CommandExecutor> =
        Arc::new(ProcessCommandExecutor::new(shutdown.clone()));
    let workspace: Arc<dyn WorkspaceOps> = Arc::new(LocalWorkspace::new(
        config.workspace.root.clone(),
        executor,
    )?);
    let agent = agent::from_config(&config.agent, shutdown.clone())?;
    let state = Arc::new(StateStore::load(config.state_file()).await?);

    let monitor = Monitor::new(
        gateway.clone(),
        workspace,
        agent,
        state,
        MonitorConfig {
            check_interval: config.check_interval(),
            max_attempts: config.monitor.max_attempts,
            dry_run: config.agent.dry_run,
            agent_prompt: config.agent.prompt.clone(),
        },
        shutdown,
    );

    if once {
        let username = gateway.authenticated_user().await?;
        monitor.run_once(&username).await;
        Ok(())
    } else {
        monitor.run().await.map_err(Into::into)
    }
}

async fn show_status(config: NightShiftConfig) -> Result<()> {
    let state = StateStore::load(config.state_file()).await?;
    let view = state.view();

    match &view.current_item {
        Some(current) => {
            println!(
                "In flight: {} {}#{} \"{}\" (attempt {}, started {})",
                current.item.kind,
                current.item.repository,
                current.item.number,
                current.item.title,
                current.attempt_count,
                current.start_time,
            );
        }
        None => println!("In flight: nothing"),
    }

    if view.recent_failures.is_empty() {
        println!("Recent failures: none");
    } else {
        println!("Recent failures:");
        let now = chrono::Utc::now();
        for (key, record) in &view.recent_failures {
            let cooling = if now < record.cooldown_until {
                format!("in cooldown until {}", record.cooldown_until)
            } else {
                "cooldown expired".to_string()
            };
            println!(
                "  {key}: {} failure(s), last {}, {cooling}",
                record.failure_count, record.last_failure,
            );
        }
    }
    println!("Last updated: {}", view.last_updated);

    Ok(())
}
