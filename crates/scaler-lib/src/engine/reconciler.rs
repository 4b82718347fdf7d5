//! Reconciliation of hosts already mid-evacuation

use crate::models::{HostRecord, LifecycleState};
use std::collections::BTreeMap;

/// A draining host confirmed to have no running or pending tasks
///
/// Only [`reconcile`] hands these out, which keeps terminate-and-decrement
/// restricted to hosts that are both draining and quiescent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuiescentHost {
    host_id: String,
}

impl QuiescentHost {
    pub fn host_id(&self) -> &str {
        &self.host_id
    }
}

/// What to do with one draining host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileVerdict {
    Terminate(QuiescentHost),
    NotEmpty { host_id: String, outstanding: u64 },
    NotFound { host_id: String },
}

impl ReconcileVerdict {
    pub fn host_id(&self) -> &str {
        match self {
            ReconcileVerdict::Terminate(host) => host.host_id(),
            ReconcileVerdict::NotEmpty { host_id, .. } => host_id,
            ReconcileVerdict::NotFound { host_id } => host_id,
        }
    }
}

/// Decide, for every draining host, whether it can be terminated
///
/// Task counts come from the draining-partition inventory only. A host with
/// no draining record there is reported as not found and never terminated.
pub fn reconcile(
    draining: &BTreeMap<String, String>,
    inventory: &[HostRecord],
) -> Vec<ReconcileVerdict> {
    draining
        .keys()
        .map(|host_id| {
            let record = inventory
                .iter()
                .find(|h| h.host_id == *host_id && h.state == LifecycleState::Draining);

            match record {
                None => ReconcileVerdict::NotFound {
                    host_id: host_id.clone(),
                },
                Some(h) if h.outstanding_tasks() == 0 => {
                    ReconcileVerdict::Terminate(QuiescentHost {
                        host_id: h.host_id.clone(),
                    })
                }
                Some(h) => ReconcileVerdict::NotEmpty {
                    host_id: host_id.clone(),
                    outstanding: h.outstanding_tasks(),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::draining_instances;

    fn draining(id: &str, running: u32, pending: u32) -> HostRecord {
        HostRecord {
            host_id: id.to_string(),
            instance_handle: format!("ci-{}", id),
            state: LifecycleState::Draining,
            running_tasks: running,
            pending_tasks: pending,
            remaining_resources: vec![],
        }
    }

    #[test]
    fn test_quiescent_host_is_terminated() {
        let inventory = vec![draining("empty", 0, 0), draining("busy", 2, 0)];
        let verdicts = reconcile(&draining_instances(&inventory), &inventory);

        assert_eq!(verdicts.len(), 2);
        let terminate: Vec<_> = verdicts
            .iter()
            .filter_map(|v| match v {
                ReconcileVerdict::Terminate(h) => Some(h.host_id()),
                _ => None,
            })
            .collect();
        assert_eq!(terminate, vec!["empty"]);

        assert!(verdicts.contains(&ReconcileVerdict::NotEmpty {
            host_id: "busy".to_string(),
            outstanding: 2,
        }));
    }

    #[test]
    fn test_pending_tasks_block_termination() {
        let inventory = vec![draining("waiting", 0, 1)];
        let verdicts = reconcile(&draining_instances(&inventory), &inventory);
        assert!(matches!(
            verdicts[0],
            ReconcileVerdict::NotEmpty { outstanding: 1, .. }
        ));
    }

    #[test]
    fn test_missing_record_is_not_found() {
        let mut ids = BTreeMap::new();
        ids.insert("ghost".to_string(), "ci-ghost".to_string());

        let verdicts = reconcile(&ids, &[draining("other", 0, 0)]);
        assert_eq!(
            verdicts,
            vec![ReconcileVerdict::NotFound {
                host_id: "ghost".to_string()
            }]
        );
    }

    #[test]
    fn test_active_record_is_not_a_draining_match() {
        let mut record = draining("flipped", 0, 0);
        record.state = LifecycleState::Active;

        let mut ids = BTreeMap::new();
        ids.insert("flipped".to_string(), "ci-flipped".to_string());

        let verdicts = reconcile(&ids, &[record]);
        assert!(matches!(verdicts[0], ReconcileVerdict::NotFound { .. }));
    }

    #[test]
    fn test_no_draining_hosts() {
        assert!(reconcile(&BTreeMap::new(), &[]).is_empty());
    }
}
