//! Structured logging setup.
//!
//! Installs a `tracing` subscriber with env-filter support and optional
//! JSON formatting for log aggregation.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name stamped on log records
    pub service_name: String,
    /// Emit JSON-formatted logs
    pub json_format: bool,
    /// Log level filter when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "legacy-trust".to_string(),
            json_format: false,
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "legacy-trust".to_string()),
            json_format: std::env::var("LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Call once at startup; a second call returns an error from the
/// underlying registry.
pub fn init(config: &TelemetryConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;
    }

    tracing::info!(service = config.service_name.as_str(), "Telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        std::env::remove_var("SERVICE_NAME");
        std::env::remove_var("LOG_JSON");
        std::env::remove_var("LOG_LEVEL");

        let config = TelemetryConfig::from_env();
        assert_eq!(config.service_name, "legacy-trust");
        assert!(!config.json_format);
        assert_eq!(config.log_level, "info");

        std::env::set_var("LOG_JSON", "1");
        assert!(TelemetryConfig::from_env().json_format);
        std::env::set_var("LOG_JSON", "false");
        assert!(!TelemetryConfig::from_env().json_format);
        std::env::remove_var("LOG_JSON");
    }
}
