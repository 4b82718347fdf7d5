//! Per-invocation control loop and its reports
//!
//! The loop ties the collaborators to the decision engine. Its reports are
//! what the binary summarizes and what the scenario tests assert on.

mod r#loop;


pub use r#loop::{ScaleInConfig, ScaleInLoop, ScaleInLoopBuilder, DEFAULT_CLUSTER_AVOID};

use crate::engine::{GateDecision, Projection};
use crate::models::UtilizationSnapshot;
use serde::Serialize;

/// Result of one backend command issued by the loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    Completed { detail: String },
    Failed { reason: String },
    /// Dry run; nothing was dispatched
    Skipped,
}

impl ActionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ActionOutcome::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ActionOutcome::Failed { .. })
    }
}

/// A command issued for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostAction {
    pub host_id: String,
    pub outcome: ActionOutcome,
}

impl HostAction {
    pub fn new(host_id: impl Into<String>, outcome: ActionOutcome) -> Self {
        Self {
            host_id: host_id.into(),
            outcome,
        }
    }
}

/// Everything one cluster evaluation observed and did
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterReport {
    pub cluster: String,
    /// Set when the cluster was not evaluated at all
    pub skipped: Option<String>,
    pub active_hosts: usize,
    pub snapshot: UtilizationSnapshot,
    pub projection: Option<Projection>,
    pub gate: Option<GateDecision>,
    pub idle_drains: Vec<HostAction>,
    pub candidate_drain: Option<HostAction>,
    pub terminations: Vec<HostAction>,
    pub not_empty: Vec<String>,
    pub not_found: Vec<String>,
}

impl ClusterReport {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            ..Default::default()
        }
    }

    fn actions(&self) -> impl Iterator<Item = &HostAction> {
        self.idle_drains
            .iter()
            .chain(self.candidate_drain.iter())
            .chain(self.terminations.iter())
    }

    /// Hosts successfully moved to DRAINING
    pub fn drained(&self) -> usize {
        self.idle_drains
            .iter()
            .chain(self.candidate_drain.iter())
            .filter(|a| a.outcome.is_completed())
            .count()
    }

    /// Hosts successfully terminated
    pub fn terminated(&self) -> usize {
        self.terminations
            .iter()
            .filter(|a| a.outcome.is_completed())
            .count()
    }

    /// Commands that failed
    pub fn failures(&self) -> usize {
        self.actions().filter(|a| a.outcome.is_failed()).count()
    }
}

/// Reports for every cluster evaluated in one invocation
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub clusters: Vec<ClusterReport>,
}

impl RunReport {
    pub fn cluster(&self, name: &str) -> Option<&ClusterReport> {
        self.clusters.iter().find(|c| c.cluster == name)
    }

    pub fn drained(&self) -> usize {
        self.clusters.iter().map(ClusterReport::drained).sum()
    }

    pub fn terminated(&self) -> usize {
        self.clusters.iter().map(ClusterReport::terminated).sum()
    }

    pub fn failures(&self) -> usize {
        self.clusters.iter().map(ClusterReport::failures).sum()
    }
}
