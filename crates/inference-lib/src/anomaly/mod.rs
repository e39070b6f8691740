//! Anomaly detection and alerting for storage conditions
//!
//! This module provides:
//! - An isolation-forest detector over environmental sensor channels
//! - Threshold alerts and product status transitions

mod alerter;
mod detector;

pub use alerter::{Alert, AlertPolicy, AlertThresholds, AlertType};
pub use detector::{
    anomaly_severity, recommendation, AnomalyModel, AnomalyTrainingReport, FeatureLayout,
    ANOMALY_MODEL, LOW_SEVERITY_SCORE, MEDIUM_SEVERITY_SCORE,
};
