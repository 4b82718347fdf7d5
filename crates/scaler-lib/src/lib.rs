//! Scale-in library for container-orchestration host fleets
//!
//! This crate provides the core functionality for:
//! - The scale-in decision engine (projection, gate, candidate selection, reconciliation)
//! - Collaborator interfaces to monitoring, orchestration and fleet backends
//! - A file-backed fleet snapshot backend
//! - The per-invocation control loop
//! - Metrics and structured logging

pub mod backend;
pub mod control;
pub mod engine;
pub mod error;
pub mod models;
pub mod observability;

pub use control::{
    ActionOutcome, ClusterReport, RunReport, ScaleInConfig, ScaleInLoop, ScaleInLoopBuilder,
};
pub use engine::ScaleInThresholds;
pub use error::{BuildError, HostDataError, ThresholdError};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
