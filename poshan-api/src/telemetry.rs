//! Tracing subscriber setup.
//!
//! JSON lines by default; `POSHAN_LOG_FORMAT=pretty` switches to
//! human-readable output for local development. `RUST_LOG` overrides the
//! default filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

const DEFAULT_FILTER: &str = "poshan_api=debug,poshan_core=debug,tower_http=debug,info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub environment: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "poshan-api".to_string(),
            environment: "development".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl TelemetryConfig {
    /// - `POSHAN_SERVICE_NAME` (default: poshan-api)
    /// - `POSHAN_ENVIRONMENT` (default: development)
    /// - `POSHAN_LOG_FORMAT`: `json` (default) or `pretty`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("POSHAN_SERVICE_NAME").unwrap_or(defaults.service_name),
            environment: std::env::var("POSHAN_ENVIRONMENT").unwrap_or(defaults.environment),
            log_format: match std::env::var("POSHAN_LOG_FORMAT")
                .map(|s| s.to_lowercase())
                .as_deref()
            {
                Ok("pretty") | Ok("text") => LogFormat::Pretty,
                _ => LogFormat::Json,
            },
        }
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    installed.map_err(|e| {
        ApiError::internal_error("Failed to init subscriber").with_diagnostic(e.to_string())
    })?;

    tracing::info!(
        service_name = config.service_name,
        environment = config.environment,
        log_format = ?config.log_format,
        "Telemetry initialized"
    );
    Ok(())
}
