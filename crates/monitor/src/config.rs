//! Monitor configuration

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Monitor configuration, read from `MONITOR_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Service name attached to structured log events
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding persisted model artifacts
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Optional JSON snapshot with products, readings and quality records
    #[serde(default)]
    pub data_file: Option<PathBuf>,
}

fn default_service_name() -> String {
    "quality-monitor".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            model_dir: default_model_dir(),
            data_file: None,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("MONITOR"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }
}
