//! # PAP Telemetry
//!
//! Observability for the envelope engine.
//!
//! ## Components
//!
//! - **Logs**: `tracing` with an `EnvFilter` and a pretty or JSON fmt layer
//! - **Metrics**: Prometheus counters, gauges and histograms
//! - **Trace context**: envelope `traceId`/`spanId` parsed into remote span contexts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pap_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::from_env()).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | unset | Full filter directive, wins over `PAP_LOG_LEVEL` |
//! | `PAP_LOG_LEVEL` | `info` | Log level filter |
//! | `PAP_JSON_LOGS` | `false` (`true` in containers) | JSON log output |
//! | `PAP_SERVICE_NAME` | `pap-engine` | Service name in the startup log |
//! | `PAP_METRICS` | `true` | Register Prometheus collectors |

mod config;
mod context;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use context::{PropagatedContext, TraceContext};
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, CORRELATIONS_PENDING,
    CORRELATION_RETIREMENTS, DIRECTIVES_RELEASED, ENVELOPES_RECEIVED, ENVELOPES_REJECTED,
    REPLAYS_DETECTED, SIGNATURE_VERIFICATIONS, VERIFICATION_DURATION,
};
pub use tracing_setup::{build_filter, init_tracing};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Metrics are registered first so that nothing is lost if the subscriber
/// is already installed by the host application.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if config.metrics_enabled {
        register_metrics()?;
    }
    init_tracing(config)
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
