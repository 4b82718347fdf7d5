//! Scale-in control loop
//!
//! One invocation walks every evaluable cluster once, in enumeration order:
//! drain idle hosts, gate and drain at most one more host, then terminate
//! draining hosts that have gone quiet. Nothing is carried between clusters
//! or between invocations.

use super::{ActionOutcome, ClusterReport, HostAction, RunReport};
use crate::backend::{
    evaluable_clusters, ActionDispatcher, ClusterEnumerator, FleetLookup, InventoryFetcher,
    UtilizationSampler,
};
use crate::engine::{
    draining_instances, evaluate, evaluate_memory, idle_hosts, project_reservation, reconcile,
    select_candidate, GateDecision, QuiescentHost, ReconcileVerdict, ScaleInThresholds,
};
use crate::error::BuildError;
use crate::models::{Cluster, HostRecord, LifecycleState, SampleWindow};
use crate::observability::{actions, drain_reasons, ScalerMetrics, StructuredLogger};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Default substring excluding clusters from evaluation
pub const DEFAULT_CLUSTER_AVOID: &str = "awseb";

/// Configuration for the scale-in loop
#[derive(Debug, Clone)]
pub struct ScaleInConfig {
    /// Gate ceilings
    pub thresholds: ScaleInThresholds,
    /// Clusters whose identifier contains this are never evaluated
    pub cluster_avoid: String,
    /// Log intended actions without dispatching them
    pub dry_run: bool,
}

impl Default for ScaleInConfig {
    fn default() -> Self {
        Self {
            thresholds: ScaleInThresholds::default(),
            cluster_avoid: DEFAULT_CLUSTER_AVOID.to_string(),
            dry_run: false,
        }
    }
}

/// Scale-in loop over every cluster of the fleet
pub struct ScaleInLoop {
    enumerator: Arc<dyn ClusterEnumerator>,
    sampler: Arc<dyn UtilizationSampler>,
    inventory: Arc<dyn InventoryFetcher>,
    fleet: Arc<dyn FleetLookup>,
    dispatcher: Arc<dyn ActionDispatcher>,
    config: ScaleInConfig,
    metrics: ScalerMetrics,
    logger: StructuredLogger,
}

impl ScaleInLoop {
    /// Evaluate every cluster once
    ///
    /// Only a failure to enumerate clusters is returned as an error; anything
    /// going wrong inside a cluster is logged and recorded in its report.
    pub async fn run_once(&self) -> Result<RunReport> {
        let start = Instant::now();

        let arns = self
            .enumerator
            .list_clusters()
            .await
            .context("Failed to list clusters")?;

        if arns.is_empty() {
            self.logger.log_no_clusters();
        }

        let arns = evaluable_clusters(arns, &self.config.cluster_avoid);
        let mut report = RunReport::default();

        for arn in arns {
            let cluster = Cluster::from_arn(arn);
            report.clusters.push(self.evaluate_cluster(&cluster).await);
        }

        self.metrics
            .observe_run_duration(start.elapsed().as_secs_f64());
        self.logger.log_run_complete(
            report.clusters.len(),
            report.drained(),
            report.terminated(),
            report.failures(),
        );

        Ok(report)
    }

    /// Evaluate a single cluster against one consistent snapshot
    pub async fn evaluate_cluster(&self, cluster: &Cluster) -> ClusterReport {
        info!(cluster = %cluster.name, "Evaluating cluster");

        let window = SampleWindow::trailing(Utc::now());
        let mut report = ClusterReport::new(&cluster.name);

        let active = match self
            .inventory
            .list_hosts(cluster, LifecycleState::Active)
            .await
        {
            Ok(hosts) => hosts,
            Err(e) => {
                self.logger.log_inventory_error(
                    &cluster.name,
                    LifecycleState::Active.as_str(),
                    &format!("{:#}", e),
                );
                return self.skip(report, "active inventory unavailable");
            }
        };

        report.snapshot.memory_reservation = self.sample_reservation(cluster, &window).await;

        if active.is_empty() {
            return self.skip(report, "no active instances in cluster");
        }

        self.metrics.inc_clusters_evaluated();
        report.active_hosts = active.len();

        let draining = match self
            .inventory
            .list_hosts(cluster, LifecycleState::Draining)
            .await
        {
            Ok(hosts) => Some(hosts),
            Err(e) => {
                self.logger.log_inventory_error(
                    &cluster.name,
                    LifecycleState::Draining.as_str(),
                    &format!("{:#}", e),
                );
                None
            }
        };

        // Idle hosts go regardless of cluster-wide utilization
        let idle = idle_hosts(&active);
        for (host_id, handle) in &idle {
            let outcome = self
                .drain(cluster, host_id, handle, drain_reasons::IDLE)
                .await;
            report.idle_drains.push(HostAction::new(host_id, outcome));
        }

        let decision = self.evaluate_gate(cluster, &active, &window, &mut report).await;
        report.gate = Some(decision);

        if decision.passed() {
            // Hosts drained as idle above are no longer scale-in candidates
            let remaining: Vec<HostRecord> = active
                .iter()
                .filter(|h| !idle.contains_key(&h.host_id))
                .cloned()
                .collect();

            let candidate = select_candidate(&remaining);
            match candidate.instance_handle.as_deref() {
                Some(handle) if !candidate.is_empty() => {
                    self.logger.log_candidate(
                        &cluster.name,
                        &candidate.host_id,
                        candidate.free_memory,
                        candidate.running_tasks,
                    );
                    let outcome = self
                        .drain(cluster, &candidate.host_id, handle, drain_reasons::GATE)
                        .await;
                    report.candidate_drain = Some(HostAction::new(&candidate.host_id, outcome));
                }
                _ => debug!(cluster = %cluster.name, "No eligible scale-in candidate"),
            }
        }

        match draining {
            Some(draining) => self.reconcile_draining(cluster, &draining, &mut report).await,
            None => debug!(
                cluster = %cluster.name,
                "Skipping reconciliation without draining inventory"
            ),
        }

        report
    }

    fn skip(&self, mut report: ClusterReport, reason: &str) -> ClusterReport {
        self.logger.log_cluster_skipped(&report.cluster, reason);
        self.metrics.inc_clusters_skipped();
        report.skipped = Some(reason.to_string());
        report
    }

    /// Run the gate, querying CPU only once both memory conditions hold
    async fn evaluate_gate(
        &self,
        cluster: &Cluster,
        active: &[HostRecord],
        window: &SampleWindow,
        report: &mut ClusterReport,
    ) -> GateDecision {
        let thresholds = &self.config.thresholds;

        let decision = match report.snapshot.memory_reservation {
            None => GateDecision::ReservationMissing,
            Some(current) => {
                let projection = project_reservation(current, active.len());
                self.logger.log_projection(&cluster.name, current, &projection);
                self.metrics
                    .set_projected_reservation(&cluster.name, projection.value());
                report.projection = Some(projection);

                let memory = evaluate_memory(thresholds, projection, Some(current));
                if memory.passed() {
                    let cpu = self.sample_cpu(cluster, window).await;
                    report.snapshot.cpu_utilization = cpu;
                    evaluate(thresholds, projection, Some(current), cpu)
                } else {
                    memory
                }
            }
        };

        self.logger.log_gate_decision(&cluster.name, &decision);
        self.metrics.record_gate_decision(&decision);
        decision
    }

    /// Cluster memory reservation; an unreadable metric counts as missing
    async fn sample_reservation(&self, cluster: &Cluster, window: &SampleWindow) -> Option<f64> {
        match self.sampler.memory_reservation(&cluster.name, window).await {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                self.logger
                    .log_metric_missing(&cluster.name, "memory_reservation", None);
                None
            }
            Err(e) => {
                let error = format!("{:#}", e);
                self.logger
                    .log_metric_missing(&cluster.name, "memory_reservation", Some(&error));
                None
            }
        }
    }

    /// Fleet-group CPU utilization; `None` when the group or datapoint is missing
    async fn sample_cpu(&self, cluster: &Cluster, window: &SampleWindow) -> Option<f64> {
        let group = match self.fleet.resolve_fleet_group(&cluster.name).await {
            Ok(Some(group)) => group,
            Ok(None) => {
                self.logger.log_fleet_group_missing(&cluster.name, None);
                return None;
            }
            Err(e) => {
                let error = format!("{:#}", e);
                self.logger
                    .log_fleet_group_missing(&cluster.name, Some(&error));
                return None;
            }
        };

        match self.sampler.fleet_cpu_utilization(&group, window).await {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                self.logger
                    .log_metric_missing(&cluster.name, "cpu_utilization", None);
                None
            }
            Err(e) => {
                let error = format!("{:#}", e);
                self.logger
                    .log_metric_missing(&cluster.name, "cpu_utilization", Some(&error));
                None
            }
        }
    }

    async fn reconcile_draining(
        &self,
        cluster: &Cluster,
        draining: &[HostRecord],
        report: &mut ClusterReport,
    ) {
        let ids = draining_instances(draining);

        for verdict in reconcile(&ids, draining) {
            match verdict {
                ReconcileVerdict::Terminate(host) => {
                    let outcome = self.terminate(cluster, &host).await;
                    report
                        .terminations
                        .push(HostAction::new(host.host_id(), outcome));
                }
                ReconcileVerdict::NotEmpty {
                    host_id,
                    outstanding,
                } => {
                    self.logger
                        .log_draining_not_empty(&cluster.name, &host_id, outstanding);
                    report.not_empty.push(host_id);
                }
                ReconcileVerdict::NotFound { host_id } => {
                    self.logger.log_draining_not_found(&cluster.name, &host_id);
                    report.not_found.push(host_id);
                }
            }
        }
    }

    /// Move one host to DRAINING; failures are logged and returned, never raised
    async fn drain(
        &self,
        cluster: &Cluster,
        host_id: &str,
        handle: &str,
        reason: &str,
    ) -> ActionOutcome {
        if self.config.dry_run {
            self.logger.log_drain(
                &cluster.name,
                host_id,
                reason,
                Ok("dry run, not dispatched"),
                true,
            );
            return ActionOutcome::Skipped;
        }

        match self.dispatcher.set_draining(cluster, handle).await {
            Ok(detail) => {
                self.logger
                    .log_drain(&cluster.name, host_id, reason, Ok(&detail), false);
                self.metrics.inc_hosts_drained(reason);
                ActionOutcome::Completed { detail }
            }
            Err(e) => {
                let error = format!("{:#}", e);
                self.logger
                    .log_drain(&cluster.name, host_id, reason, Err(&error), false);
                self.metrics.inc_action_failures(actions::DRAIN);
                ActionOutcome::Failed { reason: error }
            }
        }
    }

    /// Terminate a quiescent draining host and shrink its fleet group by one
    async fn terminate(&self, cluster: &Cluster, host: &QuiescentHost) -> ActionOutcome {
        if self.config.dry_run {
            self.logger.log_termination(
                &cluster.name,
                host.host_id(),
                Ok("dry run, not dispatched"),
                true,
            );
            return ActionOutcome::Skipped;
        }

        match self.dispatcher.terminate_and_decrement(host.host_id()).await {
            Ok(detail) => {
                self.logger
                    .log_termination(&cluster.name, host.host_id(), Ok(&detail), false);
                self.metrics.inc_hosts_terminated();
                ActionOutcome::Completed { detail }
            }
            Err(e) => {
                let error = format!("{:#}", e);
                self.logger
                    .log_termination(&cluster.name, host.host_id(), Err(&error), false);
                self.metrics.inc_action_failures(actions::TERMINATE);
                ActionOutcome::Failed { reason: error }
            }
        }
    }
}

/// Builder for assembling the scale-in loop from its collaborators
pub struct ScaleInLoopBuilder {
    enumerator: Option<Arc<dyn ClusterEnumerator>>,
    sampler: Option<Arc<dyn UtilizationSampler>>,
    inventory: Option<Arc<dyn InventoryFetcher>>,
    fleet: Option<Arc<dyn FleetLookup>>,
    dispatcher: Option<Arc<dyn ActionDispatcher>>,
    config: ScaleInConfig,
    logger: Option<StructuredLogger>,
}

impl ScaleInLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            enumerator: None,
            sampler: None,
            inventory: None,
            fleet: None,
            dispatcher: None,
            config: ScaleInConfig::default(),
            logger: None,
        }
    }

    /// Use one backend for every collaborator
    pub fn backend<B>(self, backend: Arc<B>) -> Self
    where
        B: ClusterEnumerator
            + UtilizationSampler
            + InventoryFetcher
            + FleetLookup
            + ActionDispatcher
            + 'static,
    {
        self.enumerator(backend.clone())
            .sampler(backend.clone())
            .inventory(backend.clone())
            .fleet_lookup(backend.clone())
            .dispatcher(backend)
    }

    pub fn enumerator(mut self, enumerator: Arc<dyn ClusterEnumerator>) -> Self {
        self.enumerator = Some(enumerator);
        self
    }

    pub fn sampler(mut self, sampler: Arc<dyn UtilizationSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn inventory(mut self, inventory: Arc<dyn InventoryFetcher>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn fleet_lookup(mut self, fleet: Arc<dyn FleetLookup>) -> Self {
        self.fleet = Some(fleet);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Replace the whole loop configuration
    pub fn config(mut self, config: ScaleInConfig) -> Self {
        self.config = config;
        self
    }

    pub fn thresholds(mut self, thresholds: ScaleInThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn cluster_avoid(mut self, avoid: impl Into<String>) -> Self {
        self.config.cluster_avoid = avoid.into();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the scale-in loop
    pub fn build(self) -> Result<ScaleInLoop, BuildError> {
        Ok(ScaleInLoop {
            enumerator: self
                .enumerator
                .ok_or(BuildError::MissingCollaborator("Cluster enumerator"))?,
            sampler: self
                .sampler
                .ok_or(BuildError::MissingCollaborator("Utilization sampler"))?,
            inventory: self
                .inventory
                .ok_or(BuildError::MissingCollaborator("Inventory fetcher"))?,
            fleet: self
                .fleet
                .ok_or(BuildError::MissingCollaborator("Fleet lookup"))?,
            dispatcher: self
                .dispatcher
                .ok_or(BuildError::MissingCollaborator("Action dispatcher"))?,
            config: self.config,
            metrics: ScalerMetrics::new(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("ecscale")),
        })
    }
}

impl Default for ScaleInLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
