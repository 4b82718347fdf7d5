//! Scale-in gate for evacuating one additional non-idle host

use super::{Projection, ScaleInThresholds};
use serde::{Deserialize, Serialize};

/// Outcome of the scale-in gate
///
/// Only `Pass` permits selecting a candidate. Missing metrics never pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateDecision {
    Pass,
    /// Too few active hosts to project a removal
    InsufficientHosts,
    ProjectedTooHigh { projected: f64 },
    ReservationMissing,
    ReservationTooHigh { reservation: f64 },
    CpuMissing,
    CpuTooHigh { cpu: f64 },
}

impl GateDecision {
    pub fn passed(&self) -> bool {
        matches!(self, GateDecision::Pass)
    }

    /// Short label used for logs and metric labels
    pub fn label(&self) -> &'static str {
        match self {
            GateDecision::Pass => "pass",
            GateDecision::InsufficientHosts => "insufficient_hosts",
            GateDecision::ProjectedTooHigh { .. } => "projected_too_high",
            GateDecision::ReservationMissing => "reservation_missing",
            GateDecision::ReservationTooHigh { .. } => "reservation_too_high",
            GateDecision::CpuMissing => "cpu_missing",
            GateDecision::CpuTooHigh { .. } => "cpu_too_high",
        }
    }
}

/// Memory half of the gate: projected and current reservation
///
/// Returns `Pass` when both memory conditions hold, so callers can defer the
/// CPU query until it is actually needed.
pub fn evaluate_memory(
    thresholds: &ScaleInThresholds,
    projection: Projection,
    reservation: Option<f64>,
) -> GateDecision {
    let Some(reservation) = reservation else {
        return GateDecision::ReservationMissing;
    };

    match projection {
        Projection::InsufficientHosts => return GateDecision::InsufficientHosts,
        Projection::Estimated(projected) if !thresholds.projected_within_ceiling(projected) => {
            return GateDecision::ProjectedTooHigh { projected }
        }
        Projection::Estimated(_) => {}
    }

    if !thresholds.reservation_below_ceiling(reservation) {
        return GateDecision::ReservationTooHigh { reservation };
    }

    GateDecision::Pass
}

/// Full gate: all three conditions must hold at once
pub fn evaluate(
    thresholds: &ScaleInThresholds,
    projection: Projection,
    reservation: Option<f64>,
    cpu: Option<f64>,
) -> GateDecision {
    let memory = evaluate_memory(thresholds, projection, reservation);
    if !memory.passed() {
        return memory;
    }

    match cpu {
        None => GateDecision::CpuMissing,
        Some(cpu) if !thresholds.cpu_below_ceiling(cpu) => GateDecision::CpuTooHigh { cpu },
        Some(_) => GateDecision::Pass,
    }
}
