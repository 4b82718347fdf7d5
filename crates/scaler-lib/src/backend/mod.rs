//! Collaborator interfaces to the monitoring, orchestration and fleet backends
//!
//! The control loop only talks to these traits. Each call is a single
//! best-effort attempt; retries and timeouts are the implementation's business.

mod snapshot;

pub use snapshot::{
    DispatchedAction, FleetSnapshot, SnapshotBackend, SnapshotCluster, SnapshotFleetGroup,
};

use crate::models::{Cluster, FleetGroupRecord, HostRecord, LifecycleState, SampleWindow, NAME_TAG};
use anyhow::Result;

pub use async_trait::async_trait;

/// Lists the clusters known to the orchestration backend
#[async_trait]
pub trait ClusterEnumerator: Send + Sync {
    /// All cluster identifiers, in backend order
    async fn list_clusters(&self) -> Result<Vec<String>>;
}

/// Short-window metric averages
#[async_trait]
pub trait UtilizationSampler: Send + Sync {
    /// Average cluster memory reservation over `window`, `None` without a datapoint
    async fn memory_reservation(
        &self,
        cluster_name: &str,
        window: &SampleWindow,
    ) -> Result<Option<f64>>;

    /// Average CPU utilization of a fleet group over `window`, `None` without a datapoint
    async fn fleet_cpu_utilization(
        &self,
        fleet_group: &str,
        window: &SampleWindow,
    ) -> Result<Option<f64>>;
}

/// Host inventory of a cluster
#[async_trait]
pub trait InventoryFetcher: Send + Sync {
    /// Hosts of `cluster` currently in `state`
    async fn list_hosts(
        &self,
        cluster: &Cluster,
        state: LifecycleState,
    ) -> Result<Vec<HostRecord>>;
}

/// Resolves the fleet group backing a cluster
#[async_trait]
pub trait FleetLookup: Send + Sync {
    async fn resolve_fleet_group(&self, cluster_name: &str) -> Result<Option<String>>;
}

/// Issues state transitions and terminations
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Put a host into the draining state; returns a human-readable status
    async fn set_draining(&self, cluster: &Cluster, instance_handle: &str) -> Result<String>;

    /// Terminate a host and decrement its fleet group's desired capacity by one
    async fn terminate_and_decrement(&self, host_id: &str) -> Result<String>;
}

/// Cluster identifiers that should be evaluated
///
/// Identifiers containing `avoid` are dropped. An empty `avoid` excludes nothing.
pub fn evaluable_clusters(arns: Vec<String>, avoid: &str) -> Vec<String> {
    if avoid.is_empty() {
        return arns;
    }
    arns.into_iter().filter(|arn| !arn.contains(avoid)).collect()
}

/// Find the fleet group whose `Name` tag starts with the cluster display name
///
/// The tag value is split on whitespace and its first token must equal
/// `cluster_name` exactly. The first matching group wins.
pub fn match_fleet_group<'a>(
    groups: &'a [FleetGroupRecord],
    cluster_name: &str,
) -> Option<&'a str> {
    groups
        .iter()
        .find(|g| {
            g.tag(NAME_TAG)
                .and_then(|v| v.split_whitespace().next())
                .map_or(false, |token| token == cluster_name)
        })
        .map(|g| g.handle.as_str())
}
