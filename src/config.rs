//! Layered configuration: built-in defaults, then `night-shift.toml`,
//! then `NIGHT_SHIFT_*` environment variables, then CLI overrides
//! applied by the binary.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::github::filter::RepoFilter;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NightShiftConfig {
    pub github: GitHubConfig,
    pub monitor: MonitorSettings,
    pub agent: AgentSettings,
    pub repositories: RepositoryFilters,
    pub workspace: WorkspaceSettings,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Personal access token. Falls back to `GITHUB_TOKEN` when unset.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Seconds between ticks.
    pub check_interval_seconds: u64,
    /// Attempts per item before it is abandoned into cooldown.
    pub max_attempts: u32,
    pub state_file_path: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval_seconds: 60,
            max_attempts: 3,
            state_file_path: ".night-shift/processing_state.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentSettings {
    /// `claude` or `shell`.
    pub kind: String,
    pub command: String,
    /// Extra arguments passed through to the agent command.
    pub args: Vec<String>,
    /// Operator text appended to every generated prompt.
    pub prompt: String,
    pub dry_run: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            kind: "claude".to_string(),
            command: "claude".to_string(),
            args: vec![],
            prompt: String::new(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RepositoryFilters {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    /// Directory holding the managed checkouts.
    pub root: String,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            root: ".night-shift/repos".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl NightShiftConfig {
    /// Load from the default locations: `night-shift.toml` if present,
    /// then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = Path::new("night-shift.toml")
            .exists()
            .then(|| PathBuf::from("night-shift.toml"));
        Self::load_from(file.as_deref())
    }

    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("NIGHT_SHIFT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("agent.args")
                .with_list_parse_key("repositories.include")
                .with_list_parse_key("repositories.exclude"),
        );

        let mut loaded: NightShiftConfig = builder.build()?.try_deserialize()?;

        // The token commonly lives in the ambient environment rather
        // than the prefixed namespace.
        if loaded.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                if !token.is_empty() {
                    loaded.github.token = Some(token);
                }
            }
        }

        loaded.validate()?;
        Ok(loaded)
    }

    /// Load `.env` if present. Called before `load()` so its variables
    /// take part in the environment layer.
    pub fn load_env_file() {
        if Path::new(".env").exists() {
            let _ = dotenvy::dotenv();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.check_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "monitor.check_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.monitor.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "monitor.max_attempts must be at least 1".to_string(),
            ));
        }
        if !matches!(self.agent.kind.as_str(), "claude" | "shell") {
            return Err(ConfigError::Invalid(format!(
                "agent.kind '{}' is not one of: claude, shell",
                self.agent.kind
            )));
        }
        self.repo_filter()?;
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.check_interval_seconds)
    }

    pub fn state_file(&self) -> PathBuf {
        PathBuf::from(&self.monitor.state_file_path)
    }

    pub fn repo_filter(&self) -> Result<RepoFilter, ConfigError> {
        RepoFilter::new(&self.repositories.include, &self.repositories.exclude)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cfg = NightShiftConfig::default();
        assert_eq!(cfg.monitor.check_interval_seconds, 60);
        assert_eq!(cfg.monitor.max_attempts, 3);
        assert_eq!(cfg.agent.kind, "claude");
        assert_eq!(cfg.agent.command, "claude");
        assert!(cfg.repositories.include.is_empty());
        assert_eq!(cfg.check_interval(), Duration::from_secs(60));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("night-shift.toml");
        std::fs::write(
            &path,
            r#"
            [monitor]
            check_interval_seconds = 15
            max_attempts = 5

            [agent]
            kind = "shell"
            command = "./my-agent.sh"
            prompt = "Be careful."

            [repositories]
            include = ["acme/*"]
            exclude = ["acme/legacy"]
            "#,
        )
        .unwrap();

        let cfg = NightShiftConfig::load_from(Some(&path)).unwrap();
        assert_eq!(cfg.monitor.check_interval_seconds, 15);
        assert_eq!(cfg.monitor.max_attempts, 5);
        assert_eq!(cfg.agent.kind, "shell");
        assert_eq!(cfg.agent.prompt, "Be careful.");
        assert_eq!(cfg.repositories.include, vec!["acme/*".to_string()]);

        let filter = cfg.repo_filter().unwrap();
        assert!(filter.matches("acme/api"));
        assert!(!filter.matches("acme/legacy"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut cfg = NightShiftConfig::default();
        cfg.monitor.check_interval_seconds = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut cfg = NightShiftConfig::default();
        cfg.monitor.max_attempts = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_agent_kind_is_rejected() {
        let mut cfg = NightShiftConfig::default();
        cfg.agent.kind = "carrier-pigeon".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }
}
