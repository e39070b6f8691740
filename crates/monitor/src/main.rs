//! Quality monitor - model serving process for medicine quality monitoring
//!
//! Loads persisted quality and anomaly models, degrading to "not trained"
//! when artifacts are missing, and serves health, readiness, metrics and
//! model status over HTTP.

use anyhow::{Context, Result};
use inference_lib::{
    health::{components, HealthRegistry},
    InMemoryStore, InferenceService, MonitoringStore, PipelineConfig, StructuredLogger,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = MONITOR_VERSION, "Starting quality-monitor");

    let config = config::MonitorConfig::load()?;
    info!(
        service = %config.service_name,
        model_dir = %config.model_dir.display(),
        "Monitor configured"
    );

    let store: Arc<dyn MonitoringStore> = match &config.data_file {
        Some(path) => Arc::new(
            InMemoryStore::from_json_file(path).context("Failed to load monitoring data")?,
        ),
        None => Arc::new(InMemoryStore::new()),
    };

    let pipeline = PipelineConfig::with_model_dir(&config.model_dir);
    let service = Arc::new(
        InferenceService::new(&pipeline, store)
            .with_logger(StructuredLogger::new(&config.service_name)),
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ARTIFACT_STORE).await;
    if !config.model_dir.is_dir() {
        warn!(model_dir = %config.model_dir.display(), "Model directory does not exist");
        health_registry
            .set_degraded(components::ARTIFACT_STORE, "model directory missing")
            .await;
    }

    let availability = service.load_models();
    health_registry
        .set_model_state(components::QUALITY_MODEL, service.quality_model().state())
        .await;
    health_registry
        .set_model_state(components::ANOMALY_MODEL, service.anomaly_model().state())
        .await;
    info!(
        quality = availability.quality,
        anomaly = availability.anomaly,
        "Model loading complete"
    );

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), service));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            result.context("API server task panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("SIGINT received, shutting down");
        }
    }

    Ok(())
}
