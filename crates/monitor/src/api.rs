//! HTTP API for health checks, Prometheus metrics, model status and product analysis

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use inference_lib::{
    health::{ComponentStatus, HealthRegistry},
    InferenceError, InferenceService, ModelStatus,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub service: Arc<InferenceService>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, service: Arc<InferenceService>) -> Self {
        Self {
            health_registry,
            service,
        }
    }
}

#[derive(Debug, Serialize)]
struct ModelsResponse {
    models: Vec<ModelStatus>,
    checked_at: DateTime<Utc>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn models_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ModelsResponse {
        models: state.service.model_status(),
        checked_at: Utc::now(),
    })
}

/// Smart analysis of one product from the monitoring store
async fn product_analysis(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
) -> Response {
    match state.service.run_smart_analysis(product_id) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            let status_code = match &e {
                InferenceError::ProductNotFound(_) | InferenceError::NoSensorData(_) => {
                    StatusCode::NOT_FOUND
                }
                InferenceError::ModelNotTrained { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InferenceError::FeatureMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status_code, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/models/status", get(models_status))
        .route("/products/:id/analysis", get(product_analysis))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
