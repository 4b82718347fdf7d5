//! Typed errors for the scaler library

use thiserror::Error;

/// A threshold outside the percentage range
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("{name} must be a finite percentage between 0 and 100, got {value}")]
    OutOfRange { name: &'static str, value: f64 },
}

/// Data-quality problems in a host's remaining-capacity listing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostDataError {
    #[error("host {host_id} reports no MEMORY entry in its remaining resources")]
    MissingMemory { host_id: String },

    #[error("host {host_id} reports {entries} MEMORY entries in its remaining resources")]
    AmbiguousMemory { host_id: String, entries: usize },
}

/// Missing collaborator when assembling the control loop
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("{0} is required")]
    MissingCollaborator(&'static str),
}
