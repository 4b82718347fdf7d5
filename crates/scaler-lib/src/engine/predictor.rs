//! Projected memory reservation after removing one host

use serde::{Deserialize, Serialize};

/// Value reported when a removal cannot be projected ("as if full")
pub const SATURATED_RESERVATION: f64 = 100.0;

/// Estimated cluster memory reservation with one fewer active host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Load of the removed host spread evenly over the remaining ones
    Estimated(f64),
    /// One or zero active hosts; removing a host is never safe
    InsufficientHosts,
}

impl Projection {
    /// The projected percentage, saturated when it cannot be estimated
    pub fn value(&self) -> f64 {
        match self {
            Projection::Estimated(v) => *v,
            Projection::InsufficientHosts => SATURATED_RESERVATION,
        }
    }
}

/// Project the reservation that results from removing one of `active_count` hosts
///
/// `current * n / (n - 1)`, kept in floating point.
pub fn project_reservation(current: f64, active_count: usize) -> Projection {
    if active_count <= 1 {
        return Projection::InsufficientHosts;
    }

    let n = active_count as f64;
    Projection::Estimated(current * n / (n - 1.0))
}
