//! Logging initialization
//!
//! Sets up JSON structured logging through `tracing-subscriber`. The filter
//! comes from `RUST_LOG` when set, otherwise from the configured log level.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log level could not be turned into a filter
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter {
        /// The rejected filter directive
        filter: String,
        /// Parser message
        message: String,
    },

    /// Failed to install the tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Configuration for telemetry initialization
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Default log level (e.g. "info", "debug") when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: crate::CONTROLLER_NAME.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Build the filter directive for this configuration
    ///
    /// Chatty HTTP layers are capped at `warn` regardless of the level.
    pub fn filter_directive(&self) -> String {
        format!(
            "{level},{crate_level},tower=warn,hyper=warn,hyper_util=warn",
            level = self.log_level,
            crate_level = format_args!("nats_controller={}", self.log_level),
        )
    }

    fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directive = self.filter_directive();
        EnvFilter::try_new(&directive).map_err(|e| TelemetryError::InvalidFilter {
            filter: directive,
            message: e.to_string(),
        })
    }
}

/// Initialize JSON logging for the process
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = config.env_filter()?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(service = %config.service_name, "telemetry initialized");
    Ok(())
}
