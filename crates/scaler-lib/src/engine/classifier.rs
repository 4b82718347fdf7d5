//! Host partition helpers

use crate::models::HostRecord;
use std::collections::BTreeMap;

/// Idle active hosts, keyed by host id with their instance handle
///
/// Idle means no running and no pending tasks. Idle hosts are eligible for
/// draining whatever the cluster-wide utilization looks like.
pub fn idle_hosts(active: &[HostRecord]) -> BTreeMap<String, String> {
    active
        .iter()
        .filter(|h| h.is_idle())
        .map(|h| (h.host_id.clone(), h.instance_handle.clone()))
        .collect()
}

/// Draining hosts keyed by host id with their instance handle
pub fn draining_instances(draining: &[HostRecord]) -> BTreeMap<String, String> {
    draining
        .iter()
        .map(|h| (h.host_id.clone(), h.instance_handle.clone()))
        .collect()
}
