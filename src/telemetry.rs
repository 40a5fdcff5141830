use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Initialize structured logging. `RUST_LOG` wins over the configured
/// level; JSON output is for deployments that ship logs somewhere.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true),
            )
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    }

    tracing::debug!("Telemetry initialized");
    Ok(())
}

/// Correlation ID linking all log records of one tick.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}
