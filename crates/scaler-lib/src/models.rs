//! Core data models for the fleet scaler
//!
//! Every value here is re-derived on each invocation from live queries and
//! never outlives a single control-loop iteration.

use crate::error::HostDataError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Name of the remaining-resource entry that carries allocatable memory
pub const MEMORY_RESOURCE: &str = "MEMORY";

/// Tag key used to associate a fleet group with a cluster
pub const NAME_TAG: &str = "Name";

/// Length of the trailing metric window
pub const SAMPLE_WINDOW_SECS: i64 = 120;

/// Granularity of a single datapoint inside the window
pub const SAMPLE_PERIOD_SECS: i64 = 60;

/// A container-orchestration cluster under evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Opaque cluster identifier (e.g. an ARN)
    pub arn: String,
    /// Display name, the path segment following the first `/`
    pub name: String,
}

impl Cluster {
    /// Derive a cluster from its identifier
    pub fn from_arn(arn: impl Into<String>) -> Self {
        let arn = arn.into();
        let name = arn.split('/').nth(1).unwrap_or(&arn).to_string();
        Self { arn, name }
    }
}

/// Lifecycle state of a host as reported by the orchestration layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleState {
    Active,
    Draining,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Draining => "DRAINING",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a host's remaining-capacity listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingResource {
    pub name: String,
    pub integer_value: i64,
}

/// A host registered with a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    /// Fleet-level host identifier (used for termination)
    pub host_id: String,
    /// Orchestration-layer instance handle (used for state transitions)
    pub instance_handle: String,
    pub state: LifecycleState,
    pub running_tasks: u32,
    pub pending_tasks: u32,
    #[serde(default)]
    pub remaining_resources: Vec<RemainingResource>,
}

impl HostRecord {
    /// Combined running and pending task count
    pub fn outstanding_tasks(&self) -> u64 {
        u64::from(self.running_tasks) + u64::from(self.pending_tasks)
    }

    /// A host is idle when nothing is running or waiting to run on it
    pub fn is_idle(&self) -> bool {
        self.running_tasks == 0 && self.pending_tasks == 0
    }

    /// All memory lines of the remaining-capacity listing, in reported order
    pub fn memory_entries(&self) -> impl Iterator<Item = &RemainingResource> {
        self.remaining_resources
            .iter()
            .filter(|r| r.name == MEMORY_RESOURCE)
    }

    /// Remaining allocatable memory
    ///
    /// Exactly one memory line is expected. With none the host has no usable
    /// capacity figure; with several the first reported line is used and the
    /// caller receives the ambiguity alongside it.
    pub fn free_memory(&self) -> Result<(i64, Option<HostDataError>), HostDataError> {
        let mut entries = self.memory_entries();
        let first = entries.next().ok_or_else(|| HostDataError::MissingMemory {
            host_id: self.host_id.clone(),
        })?;

        let extra = entries.count();
        let ambiguity = (extra > 0).then(|| HostDataError::AmbiguousMemory {
            host_id: self.host_id.clone(),
            entries: extra + 1,
        });

        Ok((first.integer_value, ambiguity))
    }
}

/// Short-window utilization averages for a cluster
///
/// `None` means the window held no datapoint, which is distinct from zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSnapshot {
    pub memory_reservation: Option<f64>,
    pub cpu_utilization: Option<f64>,
}

/// The host judged best to evacuate
///
/// `Default` is the empty sentinel returned when there was nothing to choose
/// from; check [`EvictionCandidate::is_empty`] before using the handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionCandidate {
    pub host_id: String,
    pub free_memory: i64,
    pub running_tasks: u32,
    pub instance_handle: Option<String>,
}

impl EvictionCandidate {
    pub fn from_host(host: &HostRecord, free_memory: i64) -> Self {
        Self {
            host_id: host.host_id.clone(),
            free_memory,
            running_tasks: host.running_tasks,
            instance_handle: Some(host.instance_handle.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.host_id.is_empty()
    }
}

/// A key/value tag attached to a fleet group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// A scaling group as listed by the fleet manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetGroupRecord {
    /// Scaling-group resource identifier
    pub handle: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl FleetGroupRecord {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

/// Trailing window passed to metric queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_secs: i64,
}

impl SampleWindow {
    /// The standard two-minute window ending at `now`
    pub fn trailing(now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::seconds(SAMPLE_WINDOW_SECS),
            end: now,
            period_secs: SAMPLE_PERIOD_SECS,
        }
    }
}
