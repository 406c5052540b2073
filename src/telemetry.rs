use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

use crate::config::LoggingConfig;
use crate::workflow::WorkflowState;

/// Initialize structured logging.
/// The configured level applies unless RUST_LOG overrides it.
pub fn init_telemetry(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log level '{}'", config.level))?;

    let console = config.console_enabled.then(|| {
        if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(std::io::stderr)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .boxed()
        }
    });

    let file = match &config.path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    tracing::info!(level = %config.level, json = config.json, "Malg-ACTA telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the operations of one testing cycle
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span entered while a state executes
pub fn create_cycle_span(state: WorkflowState, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "workflow_cycle",
        state = %state,
        correlation.id = correlation_id,
    )
}
