//! Prometheus metrics for the PAP engine.
//!
//! All metrics follow the naming convention: `pap_<noun>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: monotonically increasing (e.g. `pap_envelopes_received_total`)
//! - **Gauge**: up or down (e.g. `pap_correlations_pending`)
//! - **Histogram**: distribution (e.g. `pap_verification_duration_seconds`)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Crate-level metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // INTAKE
    // =========================================================================

    /// Envelopes handed to the engine, by body kind
    pub static ref ENVELOPES_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("pap_envelopes_received_total", "Envelopes received by the engine"),
        &["kind"]
    ).expect("metric creation failed");

    /// Envelopes rejected, by taxonomy code
    pub static ref ENVELOPES_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("pap_envelopes_rejected_total", "Envelopes rejected by the engine"),
        &["code"]
    ).expect("metric creation failed");

    // =========================================================================
    // AUTHENTICATION
    // =========================================================================

    /// Nonces presented twice inside the replay window
    pub static ref REPLAYS_DETECTED: IntCounter = IntCounter::new(
        "pap_replays_detected_total",
        "Envelopes rejected as replays"
    ).expect("metric creation failed");

    /// Signature checks by algorithm and outcome
    pub static ref SIGNATURE_VERIFICATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("pap_signature_verifications_total", "Signature verifications"),
        &["algorithm", "outcome"]  // outcome: valid/invalid
    ).expect("metric creation failed");

    /// Time spent in the auth verifier
    pub static ref VERIFICATION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "pap_verification_duration_seconds",
            "Time spent authenticating an envelope"
        ).buckets(exponential_buckets(0.00001, 2.0, 15).unwrap_or_default())
    ).expect("metric creation failed");

    // =========================================================================
    // CORRELATION & CONTROL
    // =========================================================================

    /// Open exchanges
    pub static ref CORRELATIONS_PENDING: IntGauge = IntGauge::new(
        "pap_correlations_pending",
        "Exchanges awaiting a terminal reply"
    ).expect("metric creation failed");

    /// Exchange retirements by reason
    pub static ref CORRELATION_RETIREMENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("pap_correlation_retirements_total", "Retired exchanges"),
        &["reason"]  // reason: final/error/timeout/cancelled
    ).expect("metric creation failed");

    /// Control directives released to their target
    pub static ref DIRECTIVES_RELEASED: IntCounterVec = IntCounterVec::new(
        Opts::new("pap_directives_released_total", "Control directives released"),
        &["control_type"]
    ).expect("metric creation failed");
}

/// Register all metrics with the crate registry.
///
/// Safe to call more than once; already-registered collectors are skipped.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Intake
        Box::new(ENVELOPES_RECEIVED.clone()),
        Box::new(ENVELOPES_REJECTED.clone()),
        // Authentication
        Box::new(REPLAYS_DETECTED.clone()),
        Box::new(SIGNATURE_VERIFICATIONS.clone()),
        Box::new(VERIFICATION_DURATION.clone()),
        // Correlation & control
        Box::new(CORRELATIONS_PENDING.clone()),
        Box::new(CORRELATION_RETIREMENTS.clone()),
        Box::new(DIRECTIVES_RELEASED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
