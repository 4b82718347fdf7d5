//! File-backed fleet snapshot
//!
//! Serves clusters, metrics, inventories and fleet groups from a JSON
//! document and applies dispatched actions to an in-memory copy of it. Used
//! for dry replays of a captured fleet and as the test double for the loop.

use super::{
    async_trait, match_fleet_group, ActionDispatcher, ClusterEnumerator, FleetLookup,
    InventoryFetcher, UtilizationSampler,
};
use crate::models::{Cluster, FleetGroupRecord, HostRecord, LifecycleState, SampleWindow, Tag};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::debug;

/// Top-level snapshot document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetSnapshot {
    #[serde(default)]
    pub clusters: Vec<SnapshotCluster>,
    #[serde(default)]
    pub fleet_groups: Vec<SnapshotFleetGroup>,
}

/// One cluster with its memory reservation datapoint and registered hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotCluster {
    pub arn: String,
    #[serde(default)]
    pub memory_reservation: Option<f64>,
    #[serde(default)]
    pub hosts: Vec<HostRecord>,
}

/// One scaling group with its CPU datapoint and capacity bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFleetGroup {
    pub handle: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub cpu_utilization: Option<f64>,
    #[serde(default)]
    pub desired_capacity: u32,
    #[serde(default)]
    pub min_size: u32,
    /// Host ids launched by this group
    #[serde(default)]
    pub members: Vec<String>,
}

/// An action applied to the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DispatchedAction {
    Drain {
        cluster_arn: String,
        instance_handle: String,
    },
    Terminate {
        host_id: String,
        fleet_group: String,
        desired_capacity: u32,
    },
}

/// Backend serving every collaborator interface from a [`FleetSnapshot`]
pub struct SnapshotBackend {
    snapshot: RwLock<FleetSnapshot>,
    actions: RwLock<Vec<DispatchedAction>>,
}

impl SnapshotBackend {
    pub fn new(snapshot: FleetSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            actions: RwLock::new(Vec::new()),
        }
    }

    /// Load a snapshot document from disk
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read fleet snapshot {}", path.display()))?;

        let snapshot: FleetSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fleet snapshot {}", path.display()))?;

        debug!(
            path = %path.display(),
            clusters = snapshot.clusters.len(),
            fleet_groups = snapshot.fleet_groups.len(),
            "Loaded fleet snapshot"
        );

        Ok(Self::new(snapshot))
    }

    /// Actions dispatched so far, in order
    pub async fn actions(&self) -> Vec<DispatchedAction> {
        self.actions.read().await.clone()
    }

    /// Current desired capacity of a fleet group
    pub async fn desired_capacity(&self, handle: &str) -> Option<u32> {
        self.snapshot
            .read()
            .await
            .fleet_groups
            .iter()
            .find(|g| g.handle == handle)
            .map(|g| g.desired_capacity)
    }
}

#[async_trait]
impl ClusterEnumerator for SnapshotBackend {
    async fn list_clusters(&self) -> Result<Vec<String>> {
        let snapshot = self.snapshot.read().await;
        Ok(snapshot.clusters.iter().map(|c| c.arn.clone()).collect())
    }
}

#[async_trait]
impl UtilizationSampler for SnapshotBackend {
    async fn memory_reservation(
        &self,
        cluster_name: &str,
        _window: &SampleWindow,
    ) -> Result<Option<f64>> {
        let snapshot = self.snapshot.read().await;
        let cluster = snapshot
            .clusters
            .iter()
            .find(|c| Cluster::from_arn(c.arn.as_str()).name == cluster_name)
            .ok_or_else(|| anyhow!("cluster {} not found", cluster_name))?;

        Ok(cluster.memory_reservation)
    }

    async fn fleet_cpu_utilization(
        &self,
        fleet_group: &str,
        _window: &SampleWindow,
    ) -> Result<Option<f64>> {
        let snapshot = self.snapshot.read().await;
        let group = snapshot
            .fleet_groups
            .iter()
            .find(|g| g.handle == fleet_group)
            .ok_or_else(|| anyhow!("fleet group {} not found", fleet_group))?;

        Ok(group.cpu_utilization)
    }
}

#[async_trait]
impl InventoryFetcher for SnapshotBackend {
    async fn list_hosts(
        &self,
        cluster: &Cluster,
        state: LifecycleState,
    ) -> Result<Vec<HostRecord>> {
        let snapshot = self.snapshot.read().await;
        let entry = snapshot
            .clusters
            .iter()
            .find(|c| c.arn == cluster.arn)
            .ok_or_else(|| anyhow!("cluster {} not found", cluster.arn))?;

        Ok(entry
            .hosts
            .iter()
            .filter(|h| h.state == state)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FleetLookup for SnapshotBackend {
    async fn resolve_fleet_group(&self, cluster_name: &str) -> Result<Option<String>> {
        let snapshot = self.snapshot.read().await;
        let groups: Vec<FleetGroupRecord> = snapshot
            .fleet_groups
            .iter()
            .map(|g| FleetGroupRecord {
                handle: g.handle.clone(),
                tags: g.tags.clone(),
            })
            .collect();

        Ok(match_fleet_group(&groups, cluster_name).map(str::to_string))
    }
}

#[async_trait]
impl ActionDispatcher for SnapshotBackend {
    async fn set_draining(&self, cluster: &Cluster, instance_handle: &str) -> Result<String> {
        let mut snapshot = self.snapshot.write().await;
        let entry = snapshot
            .clusters
            .iter_mut()
            .find(|c| c.arn == cluster.arn)
            .ok_or_else(|| anyhow!("cluster {} not found", cluster.arn))?;

        let host = entry
            .hosts
            .iter_mut()
            .find(|h| h.instance_handle == instance_handle)
            .ok_or_else(|| {
                anyhow!(
                    "instance {} is not registered with {}",
                    instance_handle,
                    cluster.name
                )
            })?;
        host.state = LifecycleState::Draining;

        self.actions.write().await.push(DispatchedAction::Drain {
            cluster_arn: cluster.arn.clone(),
            instance_handle: instance_handle.to_string(),
        });

        Ok(format!("{} set to DRAINING", instance_handle))
    }

    async fn terminate_and_decrement(&self, host_id: &str) -> Result<String> {
        let mut snapshot = self.snapshot.write().await;
        let group = snapshot
            .fleet_groups
            .iter_mut()
            .find(|g| g.members.iter().any(|m| m == host_id))
            .ok_or_else(|| anyhow!("instance {} is not part of any fleet group", host_id))?;

        if group.desired_capacity <= group.min_size {
            bail!(
                "desired capacity {} of {} cannot go below minimum size {}",
                group.desired_capacity,
                group.handle,
                group.min_size
            );
        }

        group.desired_capacity -= 1;
        group.members.retain(|m| m != host_id);
        let handle = group.handle.clone();
        let desired_capacity = group.desired_capacity;

        for cluster in snapshot.clusters.iter_mut() {
            cluster.hosts.retain(|h| h.host_id != host_id);
        }

        self.actions.write().await.push(DispatchedAction::Terminate {
            host_id: host_id.to_string(),
            fleet_group: handle.clone(),
            desired_capacity,
        });

        Ok(format!(
            "Terminating instance {}; desired capacity of {} changed to {}",
            host_id, handle, desired_capacity
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RemainingResource, MEMORY_RESOURCE, NAME_TAG};
    use chrono::Utc;

    const ARN: &str = "arn:aws:ecs:us-east-1:1:cluster/web";

    fn host(id: &str, state: LifecycleState, running: u32) -> HostRecord {
        HostRecord {
            host_id: id.to_string(),
            instance_handle: format!("ci-{}", id),
            state,
            running_tasks: running,
            pending_tasks: 0,
            remaining_resources: vec![RemainingResource {
                name: MEMORY_RESOURCE.to_string(),
                integer_value: 1024,
            }],
        }
    }

    fn snapshot() -> FleetSnapshot {
        FleetSnapshot {
            clusters: vec![SnapshotCluster {
                arn: ARN.to_string(),
                memory_reservation: Some(42.0),
                hosts: vec![
                    host("i-1", LifecycleState::Active, 3),
                    host("i-2", LifecycleState::Draining, 0),
                ],
            }],
            fleet_groups: vec![SnapshotFleetGroup {
                handle: "asg-web".to_string(),
                tags: vec![Tag {
                    key: NAME_TAG.to_string(),
                    value: "web ECS host".to_string(),
                }],
                cpu_utilization: Some(12.5),
                desired_capacity: 2,
                min_size: 1,
                members: vec!["i-1".to_string(), "i-2".to_string()],
            }],
        }
    }

    #[tokio::test]
    async fn test_snapshot_queries() {
        let backend = SnapshotBackend::new(snapshot());
        let window = SampleWindow::trailing(Utc::now());
        let cluster = Cluster::from_arn(ARN);

        assert_eq!(backend.list_clusters().await.unwrap(), vec![ARN.to_string()]);
        assert_eq!(backend.memory_reservation("web", &window).await.unwrap(), Some(42.0));
        assert_eq!(
            backend.resolve_fleet_group("web").await.unwrap().as_deref(),
            Some("asg-web")
        );
        assert_eq!(
            backend.fleet_cpu_utilization("asg-web", &window).await.unwrap(),
            Some(12.5)
        );

        let active = backend.list_hosts(&cluster, LifecycleState::Active).await.unwrap();
        let draining = backend.list_hosts(&cluster, LifecycleState::Draining).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(draining[0].host_id, "i-2");
    }

    #[tokio::test]
    async fn test_drain_moves_host_and_records_action() {
        let backend = SnapshotBackend::new(snapshot());
        let cluster = Cluster::from_arn(ARN);

        backend.set_draining(&cluster, "ci-i-1").await.unwrap();

        let active = backend.list_hosts(&cluster, LifecycleState::Active).await.unwrap();
        assert!(active.is_empty());
        assert_eq!(
            backend.actions().await,
            vec![DispatchedAction::Drain {
                cluster_arn: ARN.to_string(),
                instance_handle: "ci-i-1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_drain_unknown_instance_fails() {
        let backend = SnapshotBackend::new(snapshot());
        let result = backend.set_draining(&Cluster::from_arn(ARN), "ci-missing").await;
        assert!(result.is_err());
        assert!(backend.actions().await.is_empty());
    }

    #[tokio::test]
    async fn test_terminate_decrements_until_minimum() {
        let backend = SnapshotBackend::new(snapshot());

        let detail = backend.terminate_and_decrement("i-2").await.unwrap();
        assert!(detail.contains("i-2"));
        assert_eq!(backend.desired_capacity("asg-web").await, Some(1));

        // Desired capacity is now at the floor
        assert!(backend.terminate_and_decrement("i-1").await.is_err());
        assert_eq!(backend.desired_capacity("asg-web").await, Some(1));
    }

    #[tokio::test]
    async fn test_terminate_unknown_host_fails() {
        let backend = SnapshotBackend::new(snapshot());
        assert!(backend.terminate_and_decrement("i-404").await.is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fleet.json");
        tokio::fs::write(&path, serde_json::to_string(&snapshot()).unwrap())
            .await
            .unwrap();

        let backend = SnapshotBackend::load(&path).await.unwrap();
        assert_eq!(backend.list_clusters().await.unwrap().len(), 1);

        let missing = SnapshotBackend::load(&dir.path().join("nope.json")).await;
        assert!(missing.is_err());
    }
}
