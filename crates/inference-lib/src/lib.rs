//! Inference library for pharmaceutical quality monitoring
//!
//! This crate provides the core functionality for:
//! - Quality score and status prediction from storage and lab conditions
//! - Environmental anomaly detection and threshold alerting
//! - Model artifact persistence
//! - Health checks and observability

pub mod anomaly;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod ml;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod service;
pub mod store;

pub use config::{PipelineConfig, MIN_TRAINING_RECORDS};
pub use error::{InferenceError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use lifecycle::ModelState;
pub use models::*;
pub use observability::{InferenceMetrics, StructuredLogger};
pub use service::{
    AlertEvaluation, Availability, InferenceService, ModelAvailability, ModelStatus,
    OverallStatus, QualityAssessment, SmartAnalysis, TimelineReport,
};
pub use store::{InMemoryStore, MonitoringStore, StoreSnapshot};
