//! Scale-in decision engine
//!
//! Pure functions over a sampled snapshot and an immutable set of thresholds:
//! - Projected-reservation prediction for removing one host
//! - Idle-host classification
//! - The three-part scale-in gate
//! - Eviction candidate selection
//! - Reconciliation of hosts already draining
//!
//! Nothing in here performs I/O; the control loop feeds it and acts on the results.

mod classifier;
mod gate;
mod predictor;
mod reconciler;
mod selector;

pub use classifier::{draining_instances, idle_hosts};
pub use gate::{evaluate, evaluate_memory, GateDecision};
pub use predictor::{project_reservation, Projection, SATURATED_RESERVATION};
pub use reconciler::{reconcile, QuiescentHost, ReconcileVerdict};
pub use selector::{candidate_order, select_candidate};

use crate::error::ThresholdError;

pub const DEFAULT_SCALE_IN_CPU_TH: f64 = 30.0;
pub const DEFAULT_SCALE_IN_MEM_TH: f64 = 60.0;
pub const DEFAULT_FUTURE_MEM_TH: f64 = 75.0;

/// Percentage ceilings that gate a non-idle scale-in
///
/// All ceilings are exclusive: a value equal to its ceiling does not pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleInThresholds {
    /// Fleet-group CPU utilization ceiling (`SCALE_IN_CPU_TH`)
    scale_in_cpu: f64,
    /// Current memory reservation ceiling (`SCALE_IN_MEM_TH`)
    scale_in_mem: f64,
    /// Projected memory reservation ceiling (`FUTURE_MEM_TH`)
    future_mem: f64,
}

impl Default for ScaleInThresholds {
    fn default() -> Self {
        Self {
            scale_in_cpu: DEFAULT_SCALE_IN_CPU_TH,
            scale_in_mem: DEFAULT_SCALE_IN_MEM_TH,
            future_mem: DEFAULT_FUTURE_MEM_TH,
        }
    }
}

impl ScaleInThresholds {
    pub fn new(
        scale_in_cpu: f64,
        scale_in_mem: f64,
        future_mem: f64,
    ) -> Result<Self, ThresholdError> {
        Ok(Self {
            scale_in_cpu: percentage("SCALE_IN_CPU_TH", scale_in_cpu)?,
            scale_in_mem: percentage("SCALE_IN_MEM_TH", scale_in_mem)?,
            future_mem: percentage("FUTURE_MEM_TH", future_mem)?,
        })
    }

    pub fn scale_in_cpu(&self) -> f64 {
        self.scale_in_cpu
    }

    pub fn scale_in_mem(&self) -> f64 {
        self.scale_in_mem
    }

    pub fn future_mem(&self) -> f64 {
        self.future_mem
    }

    /// Projected reservation stays under the post-removal ceiling
    pub fn projected_within_ceiling(&self, projected: f64) -> bool {
        projected < self.future_mem
    }

    /// Current reservation is low enough to consider removing a host
    pub fn reservation_below_ceiling(&self, reservation: f64) -> bool {
        reservation < self.scale_in_mem
    }

    /// Fleet-group CPU is low enough to consider removing a host
    pub fn cpu_below_ceiling(&self, cpu: f64) -> bool {
        cpu < self.scale_in_cpu
    }
}

fn percentage(name: &'static str, value: f64) -> Result<f64, ThresholdError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(ThresholdError::OutOfRange { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let thresholds = ScaleInThresholds::default();
        assert_eq!(thresholds.scale_in_cpu(), 30.0);
        assert_eq!(thresholds.scale_in_mem(), 60.0);
        assert_eq!(thresholds.future_mem(), 75.0);
    }

    #[test]
    fn test_thresholds_reject_out_of_range() {
        assert!(ScaleInThresholds::new(30.0, 60.0, 75.0).is_ok());
        assert!(ScaleInThresholds::new(-1.0, 60.0, 75.0).is_err());
        assert!(ScaleInThresholds::new(30.0, 160.0, 75.0).is_err());

        let err = ScaleInThresholds::new(30.0, 60.0, f64::NAN).unwrap_err();
        assert!(err.to_string().contains("FUTURE_MEM_TH"));
    }

    #[test]
    fn test_thresholds_accept_range_bounds() {
        let thresholds = ScaleInThresholds::new(0.0, 100.0, 100.0).unwrap();
        assert_eq!(thresholds.scale_in_cpu(), 0.0);
        assert_eq!(thresholds.future_mem(), 100.0);

        let err = ScaleInThresholds::new(30.0, 60.0, 100.5).unwrap_err();
        assert_eq!(
            err,
            ThresholdError::OutOfRange {
                name: "FUTURE_MEM_TH",
                value: 100.5
            }
        );
    }

    #[test]
    fn test_ceilings_are_exclusive() {
        let thresholds = ScaleInThresholds::default();
        assert!(!thresholds.projected_within_ceiling(75.0));
        assert!(thresholds.projected_within_ceiling(74.99));
        assert!(!thresholds.reservation_below_ceiling(60.0));
        assert!(!thresholds.cpu_below_ceiling(30.0));
        assert!(thresholds.cpu_below_ceiling(29.5));
    }
}
