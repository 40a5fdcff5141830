// Night Shift - works your GitHub queue with an AI agent
// This exposes the core components for testing and integration

pub mod agent;
pub mod config;
pub mod external;
pub mod github;
pub mod monitor;
pub mod prioritizer;
pub mod prompt;
pub mod resolution;
pub mod shutdown;
pub mod state;
pub mod telemetry;
pub mod workitem;
pub mod workspace;

// Re-export key types for easy access
pub use agent::{AgentError, AgentRequest, AgentRunner};
pub use config::{ConfigError, NightShiftConfig};
pub use external::{CommandError, CommandExecutor, CommandOutput, ProcessCommandExecutor};
pub use github::{GitHubClient, GitHubError, GitHubOps, RepoFilter};
pub use monitor::{Monitor, MonitorConfig, MonitorError};
pub use prioritizer::PrioritizedItem;
pub use resolution::ResolutionOutcome;
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use state::{FailureRecord, ProcessingState, StateError, StateStore};
pub use workitem::{ItemDetails, ItemKind, PendingSnapshot, ProcessingItem, WorkItem};
pub use workspace::{LocalWorkspace, WorkspaceError, WorkspaceOps};
