//! Observability infrastructure for the incident forwarder
//!
//! Covers Prometheus instruments (sampling latency, forwarded lines,
//! delivery failures, lifecycle state) and the structured JSON event
//! log emitted through tracing.

use prometheus::{
    register_gauge_vec, register_histogram, register_int_gauge, GaugeVec, Histogram, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for snapshot sampling (in seconds)
///
/// A containerized snapshot blocks for one or two 1-second CPU windows,
/// so the buckets extend well past the sub-second range.
const SAMPLING_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 1.5, 2.0, 2.5, 5.0, 10.0,
];

/// Instruments register with the default registry exactly once per process
static GLOBAL_METRICS: OnceLock<ForwarderMetricsInner> = OnceLock::new();

struct ForwarderMetricsInner {
    sampling_duration_seconds: Histogram,
    lines_forwarded: IntGauge,
    delivery_failures: IntGauge,
    sampling_errors: IntGauge,
    forwarder_state: GaugeVec,
    runtime_info: GaugeVec,
}

impl ForwarderMetricsInner {
    fn new() -> Self {
        Self {
            sampling_duration_seconds: register_histogram!(
                "incident_forwarder_sampling_duration_seconds",
                "Time spent producing one metrics snapshot",
                SAMPLING_BUCKETS.to_vec()
            )
            .expect("Failed to register sampling_duration_seconds"),

            lines_forwarded: register_int_gauge!(
                "incident_forwarder_lines_forwarded_total",
                "Total number of log lines forwarded to the collector"
            )
            .expect("Failed to register lines_forwarded"),

            delivery_failures: register_int_gauge!(
                "incident_forwarder_delivery_failures_total",
                "Total number of lines whose delivery reported at least one failed record"
            )
            .expect("Failed to register delivery_failures"),

            sampling_errors: register_int_gauge!(
                "incident_forwarder_sampling_errors_total",
                "Total number of cycles skipped because sampling failed"
            )
            .expect("Failed to register sampling_errors"),

            forwarder_state: register_gauge_vec!(
                "incident_forwarder_state",
                "Current lifecycle state of the streaming forwarder",
                &["state"]
            )
            .expect("Failed to register forwarder_state"),

            runtime_info: register_gauge_vec!(
                "incident_forwarder_runtime_info",
                "Detected container runtime for this process",
                &["runtime"]
            )
            .expect("Failed to register runtime_info"),
        }
    }
}

/// Cheap cloneable handle over the process-global instruments
#[derive(Clone)]
pub struct ForwarderMetrics {
    // Marker only, every recording path goes through GLOBAL_METRICS
    _private: (),
}

impl Default for ForwarderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwarderMetrics {
    /// Create a handle, registering the instruments on first call
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ForwarderMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ForwarderMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a sampling latency observation
    pub fn observe_sampling_duration(&self, duration_secs: f64) {
        self.inner().sampling_duration_seconds.observe(duration_secs);
    }

    /// Increment the forwarded-lines counter
    pub fn inc_lines_forwarded(&self) {
        self.inner().lines_forwarded.inc();
    }

    /// Increment the delivery-failure counter
    pub fn inc_delivery_failures(&self) {
        self.inner().delivery_failures.inc();
    }

    /// Increment the sampling-error counter
    pub fn inc_sampling_errors(&self) {
        self.inner().sampling_errors.inc();
    }

    /// Update the lifecycle state gauge
    pub fn set_state(&self, state: &str) {
        // Reset previous state
        self.inner().forwarder_state.reset();
        // Set new state with value 1
        self.inner()
            .forwarder_state
            .with_label_values(&[state])
            .set(1.0);
    }

    /// Record the detected container runtime
    pub fn set_runtime(&self, runtime: &str) {
        self.inner().runtime_info.reset();
        self.inner().runtime_info.with_label_values(&[runtime]).set(1.0);
    }
}

/// Structured logger for forwarder events
///
/// Provides consistent JSON-formatted logging for forwarded lines,
/// lifecycle transitions, and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Log a forwarded line with its delivery outcome
    pub fn log_line_forwarded(&self, preview: &str, severity: f64, level: &str, delivered: bool) {
        if delivered {
            info!(
                event = "line_forwarded",
                service = %self.service_name,
                preview = %preview,
                severity = severity,
                level = %level,
                "Log line forwarded"
            );
        } else {
            warn!(
                event = "line_forwarded",
                service = %self.service_name,
                preview = %preview,
                severity = severity,
                level = %level,
                delivered = false,
                "Log line forwarded with delivery errors"
            );
        }
    }

    /// Log the startup verification outcome
    pub fn log_verification(&self, delivered: bool) {
        if delivered {
            info!(
                event = "startup_verification",
                service = %self.service_name,
                delivered = true,
                "Startup verification incident delivered"
            );
        } else {
            warn!(
                event = "startup_verification",
                service = %self.service_name,
                delivered = false,
                "Startup verification incident reported delivery errors"
            );
        }
    }

    /// Log a lifecycle transition
    pub fn log_state_change(&self, state: &str) {
        info!(
            event = "state_change",
            service = %self.service_name,
            state = %state,
            "Forwarder state changed"
        );
    }

    /// Log forwarder startup
    pub fn log_startup(&self, version: &str, runtime: &str) {
        info!(
            event = "forwarder_started",
            service = %self.service_name,
            forwarder_version = %version,
            runtime = %runtime,
            "Incident forwarder started"
        );
    }

    /// Log forwarder shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "forwarder_shutdown",
            service = %self.service_name,
            reason = %reason,
            "Incident forwarder shutting down"
        );
    }
}
