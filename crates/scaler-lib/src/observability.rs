//! Observability infrastructure for the fleet scaler
//!
//! Provides:
//! - Prometheus metrics (drains, terminations, gate outcomes, projected reservation, run duration)
//! - Structured JSON logging with tracing

use crate::engine::{GateDecision, Projection};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    Encoder, GaugeVec, Histogram, IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for a full run (in seconds)
const RUN_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    run_duration_seconds: Histogram,
    clusters_evaluated: IntCounter,
    clusters_skipped: IntCounter,
    hosts_drained: IntCounterVec,
    hosts_terminated: IntCounter,
    action_failures: IntCounterVec,
    gate_decisions: IntCounterVec,
    projected_reservation: GaugeVec,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            run_duration_seconds: register_histogram!(
                "ecscale_run_duration_seconds",
                "Time spent evaluating all clusters in one invocation",
                RUN_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register run_duration_seconds"),

            clusters_evaluated: register_int_counter!(
                "ecscale_clusters_evaluated_total",
                "Clusters evaluated by the scale-in loop"
            )
            .expect("Failed to register clusters_evaluated"),

            clusters_skipped: register_int_counter!(
                "ecscale_clusters_skipped_total",
                "Clusters skipped for lack of active hosts or inventory"
            )
            .expect("Failed to register clusters_skipped"),

            hosts_drained: register_int_counter_vec!(
                "ecscale_hosts_drained_total",
                "Hosts moved to DRAINING, by reason",
                &["reason"]
            )
            .expect("Failed to register hosts_drained"),

            hosts_terminated: register_int_counter!(
                "ecscale_hosts_terminated_total",
                "Quiescent draining hosts terminated with capacity decrement"
            )
            .expect("Failed to register hosts_terminated"),

            action_failures: register_int_counter_vec!(
                "ecscale_action_failures_total",
                "Backend commands that failed, by action",
                &["action"]
            )
            .expect("Failed to register action_failures"),

            gate_decisions: register_int_counter_vec!(
                "ecscale_gate_decisions_total",
                "Scale-in gate evaluations, by outcome",
                &["outcome"]
            )
            .expect("Failed to register gate_decisions"),

            projected_reservation: register_gauge_vec!(
                "ecscale_projected_memory_reservation_percent",
                "Projected memory reservation after removing one host",
                &["cluster"]
            )
            .expect("Failed to register projected_reservation"),
        }
    }
}

/// Drain reasons used as metric labels
pub mod drain_reasons {
    pub const IDLE: &str = "idle";
    pub const GATE: &str = "gate";
}

/// Backend actions used as metric labels
pub mod actions {
    pub const DRAIN: &str = "drain";
    pub const TERMINATE: &str = "terminate";
}

/// Scaler metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    pub fn observe_run_duration(&self, duration_secs: f64) {
        self.inner().run_duration_seconds.observe(duration_secs);
    }

    pub fn inc_clusters_evaluated(&self) {
        self.inner().clusters_evaluated.inc();
    }

    pub fn inc_clusters_skipped(&self) {
        self.inner().clusters_skipped.inc();
    }

    pub fn inc_hosts_drained(&self, reason: &str) {
        self.inner().hosts_drained.with_label_values(&[reason]).inc();
    }

    pub fn inc_hosts_terminated(&self) {
        self.inner().hosts_terminated.inc();
    }

    pub fn inc_action_failures(&self, action: &str) {
        self.inner().action_failures.with_label_values(&[action]).inc();
    }

    pub fn record_gate_decision(&self, decision: &GateDecision) {
        self.inner()
            .gate_decisions
            .with_label_values(&[decision.label()])
            .inc();
    }

    pub fn set_projected_reservation(&self, cluster: &str, projected: f64) {
        self.inner()
            .projected_reservation
            .with_label_values(&[cluster])
            .set(projected);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for scaler events
///
/// Every event carries an `event` field and the scaler instance name.
#[derive(Clone)]
pub struct StructuredLogger {
    scaler: String,
}

impl StructuredLogger {
    pub fn new(scaler: impl Into<String>) -> Self {
        Self {
            scaler: scaler.into(),
        }
    }

    pub fn log_startup(&self, version: &str, dry_run: bool) {
        info!(
            event = "scaler_started",
            scaler = %self.scaler,
            version = %version,
            dry_run = dry_run,
            "Fleet scaler started"
        );
    }

    pub fn log_run_complete(
        &self,
        clusters: usize,
        drained: usize,
        terminated: usize,
        failures: usize,
    ) {
        info!(
            event = "run_complete",
            scaler = %self.scaler,
            clusters = clusters,
            drained = drained,
            terminated = terminated,
            failures = failures,
            "Scale-in run complete"
        );
    }

    pub fn log_no_clusters(&self) {
        info!(event = "no_clusters", scaler = %self.scaler, "No cluster found");
    }

    pub fn log_cluster_skipped(&self, cluster: &str, reason: &str) {
        info!(
            event = "cluster_skipped",
            scaler = %self.scaler,
            cluster = %cluster,
            reason = %reason,
            "Cluster skipped"
        );
    }

    pub fn log_projection(&self, cluster: &str, current: f64, projection: &Projection) {
        match projection {
            Projection::Estimated(projected) => info!(
                event = "reservation_projected",
                scaler = %self.scaler,
                cluster = %cluster,
                current = current,
                projected = projected,
                "Current reservation vs projected"
            ),
            Projection::InsufficientHosts => warn!(
                event = "reservation_projected",
                scaler = %self.scaler,
                cluster = %cluster,
                current = current,
                projected = projection.value(),
                "Insufficient hosts to project reservation"
            ),
        }
    }

    pub fn log_metric_missing(&self, cluster: &str, metric: &str, error: Option<&str>) {
        warn!(
            event = "metric_missing",
            scaler = %self.scaler,
            cluster = %cluster,
            metric = %metric,
            error = ?error,
            "No datapoint in sample window"
        );
    }

    pub fn log_fleet_group_missing(&self, cluster: &str, error: Option<&str>) {
        warn!(
            event = "fleet_group_missing",
            scaler = %self.scaler,
            cluster = %cluster,
            error = ?error,
            "Fleet group for cluster not found"
        );
    }

    pub fn log_gate_decision(&self, cluster: &str, decision: &GateDecision) {
        info!(
            event = "gate_decision",
            scaler = %self.scaler,
            cluster = %cluster,
            outcome = %decision.label(),
            detail = ?decision,
            "Scale-in gate evaluated"
        );
    }

    pub fn log_candidate(
        &self,
        cluster: &str,
        host_id: &str,
        free_memory: i64,
        running_tasks: u32,
    ) {
        info!(
            event = "scale_candidate",
            scaler = %self.scaler,
            cluster = %cluster,
            host_id = %host_id,
            free_memory = free_memory,
            running_tasks = running_tasks,
            "Scale-in candidate selected"
        );
    }

    pub fn log_drain(
        &self,
        cluster: &str,
        host_id: &str,
        reason: &str,
        outcome: Result<&str, &str>,
        dry_run: bool,
    ) {
        match outcome {
            Ok(detail) => info!(
                event = "host_drain",
                scaler = %self.scaler,
                cluster = %cluster,
                host_id = %host_id,
                reason = %reason,
                dry_run = dry_run,
                detail = %detail,
                "Draining host"
            ),
            Err(error) => warn!(
                event = "host_drain_failed",
                scaler = %self.scaler,
                cluster = %cluster,
                host_id = %host_id,
                reason = %reason,
                error = %error,
                "Draining failed"
            ),
        }
    }

    pub fn log_termination(
        &self,
        cluster: &str,
        host_id: &str,
        outcome: Result<&str, &str>,
        dry_run: bool,
    ) {
        match outcome {
            Ok(detail) => info!(
                event = "host_terminated",
                scaler = %self.scaler,
                cluster = %cluster,
                host_id = %host_id,
                dry_run = dry_run,
                detail = %detail,
                "Terminating draining host with no tasks"
            ),
            Err(error) => warn!(
                event = "host_termination_failed",
                scaler = %self.scaler,
                cluster = %cluster,
                host_id = %host_id,
                error = %error,
                "Termination failed"
            ),
        }
    }

    pub fn log_draining_not_empty(&self, cluster: &str, host_id: &str, outstanding: u64) {
        info!(
            event = "draining_not_empty",
            scaler = %self.scaler,
            cluster = %cluster,
            host_id = %host_id,
            outstanding_tasks = outstanding,
            "Draining host not empty"
        );
    }

    pub fn log_draining_not_found(&self, cluster: &str, host_id: &str) {
        warn!(
            event = "draining_not_found",
            scaler = %self.scaler,
            cluster = %cluster,
            host_id = %host_id,
            "Draining host not found in inventory"
        );
    }

    pub fn log_inventory_error(&self, cluster: &str, state: &str, error: &str) {
        warn!(
            event = "inventory_failed",
            scaler = %self.scaler,
            cluster = %cluster,
            state = %state,
            error = %error,
            "Could not fetch host inventory"
        );
    }
}
