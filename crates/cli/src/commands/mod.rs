//! Subcommand implementations

pub mod analyze;
pub mod detect;
pub mod predict;
pub mod train;

use anyhow::{Context as _, Result};
use inference_lib::{InMemoryStore, InferenceService, MonitoringStore, PipelineConfig};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::output::OutputFormat;

/// Resolved global options shared by every subcommand
pub struct Context {
    pub model_dir: PathBuf,
    pub format: OutputFormat,
}

impl Context {
    pub fn new(model_dir: PathBuf, format: OutputFormat) -> Self {
        Self { model_dir, format }
    }

    /// Service without loading any artifacts
    pub fn service(&self, store: Arc<dyn MonitoringStore>) -> InferenceService {
        InferenceService::new(&PipelineConfig::with_model_dir(&self.model_dir), store)
    }

    /// Service with whatever models are persisted in the model directory
    pub fn loaded_service(&self, store: Arc<dyn MonitoringStore>) -> InferenceService {
        let service = self.service(store);
        let availability = service.load_models();
        debug!(
            model_dir = %self.model_dir.display(),
            quality = availability.quality,
            anomaly = availability.anomaly,
            "Models loaded"
        );
        service
    }

    pub fn empty_store() -> Arc<dyn MonitoringStore> {
        Arc::new(InMemoryStore::new())
    }
}

/// Read and parse a JSON input file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
