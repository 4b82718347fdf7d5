//! Scaler configuration

use scaler_lib::{ScaleInConfig, ScaleInThresholds, ThresholdError};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration file looked up when `ECSCALE_CONFIG` is not set
const DEFAULT_CONFIG_FILE: &str = "ecscale";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),
}

/// Scaler configuration
///
/// Read from an optional `ecscale.{toml,json,yaml}` file, then overridden by
/// same-named environment variables (`SCALE_IN_CPU_TH`, `DRY_RUN`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct ScalerConfig {
    /// Fleet-group CPU ceiling in percent
    #[serde(default = "default_scale_in_cpu_th")]
    pub scale_in_cpu_th: f64,

    /// Current memory reservation ceiling in percent
    #[serde(default = "default_scale_in_mem_th")]
    pub scale_in_mem_th: f64,

    /// Projected memory reservation ceiling in percent
    #[serde(default = "default_future_mem_th")]
    pub future_mem_th: f64,

    /// Clusters whose identifier contains this are left alone
    #[serde(default = "default_ecs_avoid_str")]
    pub ecs_avoid_str: String,

    /// Fleet snapshot the backend serves from
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Log intended drains and terminations without issuing them
    #[serde(default)]
    pub dry_run: bool,

    /// Prometheus textfile to write after the run
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,

    /// Instance name attached to every log event
    #[serde(default = "default_scaler_name")]
    pub scaler_name: String,
}

fn default_scale_in_cpu_th() -> f64 {
    scaler_lib::engine::DEFAULT_SCALE_IN_CPU_TH
}

fn default_scale_in_mem_th() -> f64 {
    scaler_lib::engine::DEFAULT_SCALE_IN_MEM_TH
}

fn default_future_mem_th() -> f64 {
    scaler_lib::engine::DEFAULT_FUTURE_MEM_TH
}

fn default_ecs_avoid_str() -> String {
    scaler_lib::control::DEFAULT_CLUSTER_AVOID.to_string()
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("fleet-snapshot.json")
}

fn default_scaler_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "ecscale".to_string())
}

impl ScalerConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("ECSCALE_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        Self::from_builder(
            config::Config::builder()
                .add_source(config::File::with_name(&file).required(false))
                .add_source(config::Environment::default()),
        )
    }

    /// Deserialize and validate from prepared sources
    pub fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.thresholds()?;
        Ok(config)
    }

    pub fn thresholds(&self) -> Result<ScaleInThresholds, ThresholdError> {
        ScaleInThresholds::new(self.scale_in_cpu_th, self.scale_in_mem_th, self.future_mem_th)
    }

    /// Settings for the scale-in loop
    pub fn loop_config(&self) -> Result<ScaleInConfig, ThresholdError> {
        Ok(ScaleInConfig {
            thresholds: self.thresholds()?,
            cluster_avoid: self.ecs_avoid_str.clone(),
            dry_run: self.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn from_toml(toml: &str) -> Result<ScalerConfig, ConfigError> {
        ScalerConfig::from_builder(
            config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.scale_in_cpu_th, 30.0);
        assert_eq!(config.scale_in_mem_th, 60.0);
        assert_eq!(config.future_mem_th, 75.0);
        assert_eq!(config.ecs_avoid_str, "awseb");
        assert_eq!(config.snapshot_path, PathBuf::from("fleet-snapshot.json"));
        assert!(!config.dry_run);
        assert!(config.metrics_textfile.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_toml(
            r#"
            scale_in_cpu_th = 20
            future_mem_th = 70.5
            ecs_avoid_str = "sandbox"
            dry_run = true
            metrics_textfile = "/var/lib/node_exporter/ecscale.prom"
            "#,
        )
        .unwrap();

        assert_eq!(config.scale_in_cpu_th, 20.0);
        assert_eq!(config.future_mem_th, 70.5);
        assert!(config.dry_run);

        let loop_config = config.loop_config().unwrap();
        assert_eq!(loop_config.cluster_avoid, "sandbox");
        assert_eq!(loop_config.thresholds.scale_in_cpu(), 20.0);
        assert_eq!(loop_config.thresholds.scale_in_mem(), 60.0);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = from_toml("scale_in_mem_th = 140").unwrap_err();
        assert!(matches!(err, ConfigError::Threshold(_)));
    }
}
