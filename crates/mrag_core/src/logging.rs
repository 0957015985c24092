//! Structured logging with tracing.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::AppError;

pub const LOG_ENV_VAR: &str = "MRAG_LOG";

/// Installs the global subscriber. `MRAG_LOG` overrides the configured level.
/// Logs go to stderr so streamed answers on stdout stay clean.
pub fn init_logging(config: &LoggingConfig) -> Result<(), AppError> {
    let level = parse_log_level(&config.level)?;
    let filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = Registry::default().with(filter);
    let installed = if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init()
    };

    installed.map_err(|e| {
        AppError::invalid_config("Failed to install log subscriber").with_details(e.to_string())
    })?;

    tracing::debug!(level = %level, json = config.json, "logging initialized");
    Ok(())
}

pub fn parse_log_level(level: &str) -> Result<Level, AppError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(AppError::invalid_config(
            "Invalid log level; use trace, debug, info, warn, or error",
        )
        .with_details(format!("level={level}"))),
    }
}
