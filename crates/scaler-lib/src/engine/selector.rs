//! Eviction candidate selection

use crate::models::{EvictionCandidate, HostRecord};
use std::cmp::Ordering;
use tracing::warn;

/// Ordering between two candidates, `Greater` meaning a better eviction target
///
/// More free memory wins; on equal free memory fewer running tasks wins.
/// Candidates equal on both compare `Equal`, and the earlier one is kept.
pub fn candidate_order(a: &EvictionCandidate, b: &EvictionCandidate) -> Ordering {
    a.free_memory
        .cmp(&b.free_memory)
        .then_with(|| b.running_tasks.cmp(&a.running_tasks))
}

/// Choose the active host best suited for evacuation
///
/// Returns the empty sentinel when no host has a usable memory figure,
/// including when `active` is empty. Hosts without a memory entry are skipped;
/// hosts with more than one are judged on the first.
pub fn select_candidate(active: &[HostRecord]) -> EvictionCandidate {
    let mut best: Option<EvictionCandidate> = None;

    for host in active {
        let free = match host.free_memory() {
            Ok((free, ambiguity)) => {
                if let Some(e) = ambiguity {
                    warn!(
                        host_id = %host.host_id,
                        error = %e,
                        "Ambiguous memory capacity, using first entry"
                    );
                }
                free
            }
            Err(e) => {
                warn!(
                    host_id = %host.host_id,
                    error = %e,
                    "Skipping host without memory capacity"
                );
                continue;
            }
        };

        let candidate = EvictionCandidate::from_host(host, free);
        best = match best {
            Some(current) if candidate_order(&candidate, &current) != Ordering::Greater => {
                Some(current)
            }
            _ => Some(candidate),
        };
    }

    best.unwrap_or_default()
}
