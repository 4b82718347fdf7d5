//! ecscale - scale-in controller for container-orchestration host fleets
//!
//! Invoked periodically by an external scheduler. Each invocation evaluates
//! every cluster once, drains idle or surplus hosts and terminates draining
//! hosts that have emptied, then exits.

use anyhow::{Context, Result};
use scaler_lib::{
    backend::SnapshotBackend, ScaleInLoopBuilder, ScalerMetrics, StructuredLogger,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const SCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting ecscale");

    let config = config::ScalerConfig::load()?;
    info!(
        scaler = %config.scaler_name,
        snapshot = %config.snapshot_path.display(),
        "Scaler configured"
    );

    let metrics = ScalerMetrics::new();
    let logger = StructuredLogger::new(&config.scaler_name);
    logger.log_startup(SCALER_VERSION, config.dry_run);

    let backend = Arc::new(SnapshotBackend::load(&config.snapshot_path).await?);

    let scaler = ScaleInLoopBuilder::new()
        .backend(backend)
        .config(config.loop_config()?)
        .logger(logger)
        .build()?;

    let report = scaler.run_once().await?;
    debug!(report = %serde_json::to_string(&report)?, "Run report");

    if let Some(path) = &config.metrics_textfile {
        write_metrics_textfile(&metrics, path).await?;
    }

    // Individual action failures are in the logs; the run itself succeeded
    info!(
        drained = report.drained(),
        terminated = report.terminated(),
        failures = report.failures(),
        "Shutting down"
    );

    Ok(())
}

/// Write the metrics exposition for a node-exporter textfile collector
///
/// Written to a sibling temp file first so the collector never reads a partial file.
async fn write_metrics_textfile(metrics: &ScalerMetrics, path: &Path) -> Result<()> {
    let body = metrics.render()?;
    let tmp = path.with_extension("prom.tmp");

    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move metrics into {}", path.display()))?;

    info!(path = %path.display(), "Metrics textfile written");
    Ok(())
}
