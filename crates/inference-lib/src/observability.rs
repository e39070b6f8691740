//! Observability infrastructure for the inference pipeline
//!
//! Provides:
//! - Prometheus metrics (prediction latency, predictions, anomalies, alerts, training runs)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge_vec,
    Histogram, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::anomaly::Alert;
use crate::models::{AnomalyResult, QualityPrediction, Severity};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<InferenceMetricsInner> = OnceLock::new();

struct InferenceMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounterVec,
    anomalies_detected: IntCounter,
    alerts_raised: IntCounterVec,
    training_runs: IntCounterVec,
    records_skipped: IntCounter,
    model_trained: IntGaugeVec,
}

impl InferenceMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "quality_inference_prediction_latency_seconds",
                "Time spent scoring a single quality or anomaly request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "quality_inference_predictions_total",
                "Total number of model predictions served",
                &["model"]
            )
            .expect("Failed to register predictions_total"),

            anomalies_detected: register_int_counter!(
                "quality_inference_anomalies_detected_total",
                "Total number of readings flagged as anomalous"
            )
            .expect("Failed to register anomalies_detected"),

            alerts_raised: register_int_counter_vec!(
                "quality_inference_alerts_total",
                "Total number of alerts raised",
                &["alert_type", "severity"]
            )
            .expect("Failed to register alerts_raised"),

            training_runs: register_int_counter_vec!(
                "quality_inference_training_runs_total",
                "Model training runs by outcome",
                &["model", "outcome"]
            )
            .expect("Failed to register training_runs"),

            records_skipped: register_int_counter!(
                "quality_inference_records_skipped_total",
                "Training records dropped for missing or invalid fields"
            )
            .expect("Failed to register records_skipped"),

            model_trained: register_int_gauge_vec!(
                "quality_inference_model_trained",
                "Whether a fitted model is installed (1) or not (0)",
                &["model"]
            )
            .expect("Failed to register model_trained"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct InferenceMetrics {
    _private: (),
}

impl Default for InferenceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(InferenceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &InferenceMetricsInner {
        GLOBAL_METRICS.get_or_init(InferenceMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self, model: &str) {
        self.inner()
            .predictions_total
            .with_label_values(&[model])
            .inc();
    }

    pub fn inc_anomalies_detected(&self) {
        self.inner().anomalies_detected.inc();
    }

    pub fn inc_alert(&self, alert: &Alert) {
        let alert_type = alert.alert_type.to_string();
        let severity = alert.severity.to_string();
        self.inner()
            .alerts_raised
            .with_label_values(&[alert_type.as_str(), severity.as_str()])
            .inc();
    }

    pub fn inc_training_run(&self, model: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.inner()
            .training_runs
            .with_label_values(&[model, outcome])
            .inc();
    }

    pub fn add_records_skipped(&self, count: usize) {
        self.inner().records_skipped.inc_by(count as u64);
    }

    pub fn set_model_trained(&self, model: &str, trained: bool) {
        self.inner()
            .model_trained
            .with_label_values(&[model])
            .set(i64::from(trained));
    }
}

/// Structured logger for pipeline events
///
/// Emits named `event` fields so JSON log consumers can filter on them.
#[derive(Clone)]
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn log_quality_prediction(&self, prediction: &QualityPrediction, latency_secs: f64) {
        info!(
            event = "quality_predicted",
            service = %self.service_name,
            quality_score = prediction.quality_score,
            quality_status = %prediction.quality_status,
            confidence = prediction.max_confidence(),
            degradation_risk = ?prediction.degradation_risk,
            latency_secs = latency_secs,
            "Quality prediction generated"
        );
    }

    pub fn log_anomaly(&self, product_id: Option<i64>, result: &AnomalyResult) {
        match result.severity {
            Severity::High | Severity::Critical => {
                warn!(
                    event = "anomaly_detected",
                    service = %self.service_name,
                    product_id = ?product_id,
                    anomaly_score = result.anomaly_score,
                    severity = %result.severity,
                    recommendation = %result.recommendation,
                    "High severity environmental anomaly"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    service = %self.service_name,
                    product_id = ?product_id,
                    anomaly_score = result.anomaly_score,
                    severity = %result.severity,
                    recommendation = %result.recommendation,
                    "Environmental anomaly detected"
                );
            }
        }
    }

    pub fn log_alert(&self, product_id: Option<i64>, alert: &Alert) {
        warn!(
            event = "alert_raised",
            service = %self.service_name,
            product_id = ?product_id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            message = %alert.message,
            "Alert raised"
        );
    }

    pub fn log_model_trained(&self, model: &str, run_id: &str, samples: usize) {
        info!(
            event = "model_trained",
            service = %self.service_name,
            model = %model,
            run_id = %run_id,
            samples = samples,
            "Model trained and persisted"
        );
    }

    pub fn log_model_load(&self, model: &str, loaded: bool) {
        if loaded {
            info!(
                event = "model_loaded",
                service = %self.service_name,
                model = %model,
                "Model loaded from artifacts"
            );
        } else {
            warn!(
                event = "model_load_failed",
                service = %self.service_name,
                model = %model,
                "Model artifacts unavailable, serving as not trained"
            );
        }
    }

    pub fn log_records_skipped(&self, skipped: usize, valid: usize) {
        if skipped > 0 {
            warn!(
                event = "records_skipped",
                service = %self.service_name,
                skipped = skipped,
                valid = valid,
                "Dropped incomplete quality records"
            );
        }
    }
}
