//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,

    /// Log level filter used when `RUST_LOG` is unset (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to install a console fmt layer at all
    pub console_output: bool,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to register the Prometheus collectors
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "pap-engine".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PAP_SERVICE_NAME`: Service name (default: pap-engine)
    /// - `PAP_LOG_LEVEL`: Log level when `RUST_LOG` is unset (default: info)
    /// - `PAP_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `PAP_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `PAP_METRICS`: Register Prometheus collectors (default: true)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("PAP_SERVICE_NAME")
                .unwrap_or_else(|_| "pap-engine".to_string()),

            log_level: env::var("PAP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("PAP_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),

            json_logs: env::var("PAP_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),

            metrics_enabled: env::var("PAP_METRICS")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }

    /// Builder-style override of the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
