//! Observability infrastructure for the tracker
//!
//! Provides:
//! - Prometheus metrics (probe outcomes and latency, samples, auto-pauses)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for probe latency (in seconds); a Lighthouse run is slow
const PROBE_LATENCY_BUCKETS: &[f64] = &[
    1.0, 2.5, 5.0, 10.0, 15.0, 20.0, 30.0, 45.0, 60.0, 90.0, 120.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<TrackerMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct TrackerMetricsInner {
    probes: IntCounterVec,
    probe_latency_seconds: HistogramVec,
    samples_recorded: IntCounterVec,
    duplicates_dropped: IntCounter,
    auto_pauses: IntCounter,
    trackers: IntGauge,
    trackers_running: IntGauge,
    snapshot_save_errors: IntCounter,
}

impl TrackerMetricsInner {
    fn new() -> Self {
        Self {
            probes: register_int_counter_vec!(
                "psi_tracker_probes_total",
                "PageSpeed probes issued, by strategy and outcome",
                &["strategy", "outcome"]
            )
            .expect("Failed to register probes_total"),

            probe_latency_seconds: register_histogram_vec!(
                "psi_tracker_probe_latency_seconds",
                "Time from probe request to settled result",
                &["strategy"],
                PROBE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register probe_latency_seconds"),

            samples_recorded: register_int_counter_vec!(
                "psi_tracker_samples_recorded_total",
                "Samples appended to a tracker history",
                &["strategy"]
            )
            .expect("Failed to register samples_recorded_total"),

            duplicates_dropped: register_int_counter!(
                "psi_tracker_duplicates_dropped_total",
                "Upstream results dropped as repeats of the previous sample"
            )
            .expect("Failed to register duplicates_dropped_total"),

            auto_pauses: register_int_counter!(
                "psi_tracker_auto_pauses_total",
                "Trackers paused because both confidence intervals were tight"
            )
            .expect("Failed to register auto_pauses_total"),

            trackers: register_int_gauge!(
                "psi_tracker_trackers",
                "Number of tracked URLs"
            )
            .expect("Failed to register trackers"),

            trackers_running: register_int_gauge!(
                "psi_tracker_trackers_running",
                "Number of tracked URLs currently polling"
            )
            .expect("Failed to register trackers_running"),

            snapshot_save_errors: register_int_counter!(
                "psi_tracker_snapshot_save_errors_total",
                "Failed attempts to persist the registry snapshot"
            )
            .expect("Failed to register snapshot_save_errors_total"),
        }
    }
}

/// Tracker metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct TrackerMetrics {
    _private: (),
}

impl Default for TrackerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(TrackerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &TrackerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a settled probe
    pub fn observe_probe(&self, strategy: &str, success: bool, duration_secs: f64) {
        let outcome = if success { "success" } else { "failure" };
        self.inner()
            .probes
            .with_label_values(&[strategy, outcome])
            .inc();
        self.inner()
            .probe_latency_seconds
            .with_label_values(&[strategy])
            .observe(duration_secs);
    }

    pub fn inc_samples_recorded(&self, strategy: &str) {
        self.inner()
            .samples_recorded
            .with_label_values(&[strategy])
            .inc();
    }

    pub fn inc_duplicates_dropped(&self) {
        self.inner().duplicates_dropped.inc();
    }

    pub fn inc_auto_pauses(&self) {
        self.inner().auto_pauses.inc();
    }

    /// Update tracker population gauges
    pub fn set_trackers(&self, total: i64, running: i64) {
        self.inner().trackers.set(total);
        self.inner().trackers_running.set(running);
    }

    pub fn inc_snapshot_save_errors(&self) {
        self.inner().snapshot_save_errors.inc();
    }
}

/// Structured logger for tracker lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, trackers: usize) {
        info!(
            event = "tracker_started",
            instance = %self.instance,
            version = %version,
            trackers = trackers,
            "PageSpeed tracker started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "tracker_shutdown",
            instance = %self.instance,
            reason = %reason,
            "PageSpeed tracker shutting down"
        );
    }

    /// Log a snapshot restore at startup
    pub fn log_restore(&self, trackers: usize, resumed: usize) {
        info!(
            event = "snapshot_restored",
            instance = %self.instance,
            trackers = trackers,
            resumed = resumed,
            "Restored trackers from snapshot"
        );
    }

    /// Log a confidence-based auto-pause
    pub fn log_auto_pause(
        &self,
        url: &str,
        mobile_ci: Option<f64>,
        desktop_ci: Option<f64>,
        mobile_samples: usize,
        desktop_samples: usize,
    ) {
        info!(
            event = "tracker_auto_paused",
            instance = %self.instance,
            url = %url,
            mobile_ci = ?mobile_ci,
            desktop_ci = ?desktop_ci,
            mobile_samples = mobile_samples,
            desktop_samples = desktop_samples,
            "Score estimate is tight enough, tracker paused"
        );
    }

    pub fn log_probe_failure(&self, url: &str, strategy: &str, error: &str) {
        warn!(
            event = "probe_failed",
            instance = %self.instance,
            url = %url,
            strategy = %strategy,
            error = %error,
            "PageSpeed probe failed"
        );
    }
}
