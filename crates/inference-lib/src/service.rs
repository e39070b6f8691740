//! Inference orchestration
//!
//! `InferenceService` owns both models, the alert policy and a handle to the
//! monitoring store, and is the single entry point used by the monitor
//! process and the CLI. Metrics and structured logs are recorded here so the
//! models themselves stay free of reporting concerns.

use crate::anomaly::{Alert, AlertPolicy, AnomalyModel, AnomalyTrainingReport, ANOMALY_MODEL};
use crate::config::PipelineConfig;
use crate::error::{InferenceError, Result};
use crate::lifecycle::ModelState;
use crate::models::{
    AnomalyResult, ProductStatus, QualityFeatures, QualityPrediction, QualityRecord,
    SensorReading, StorageConditions, TimelinePoint,
};
use crate::observability::{InferenceMetrics, StructuredLogger};
use crate::predictor::{
    predictive_warning, quality_recommendation, FeaturePreparer, QualityModel,
    QualityTrainingReport, QUALITY_MODEL, SAFE_QUALITY_THRESHOLD, TIMELINE_WARNING,
};
use crate::store::MonitoringStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Inputs assumed by smart analysis where no lab measurement exists
pub const DEFAULT_PH: f64 = 7.0;
pub const DEFAULT_MOISTURE: f64 = 5.0;
pub const DEFAULT_IMPURITY: f64 = 0.5;
pub const DEFAULT_ACTIVE_INGREDIENT: f64 = 95.0;

/// Horizon of the timeline projected by smart analysis
pub const SMART_ANALYSIS_HORIZON_DAYS: u32 = 30;

/// Number of timeline points included in a smart analysis report
pub const SMART_ANALYSIS_TIMELINE_POINTS: usize = 5;

/// Quality prediction plus the guidance derived from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    #[serde(flatten)]
    pub prediction: QualityPrediction,
    pub recommendation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<Alert>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineReport {
    pub timeline: Vec<TimelinePoint>,
    /// Set when any projected point falls below the safe threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvaluation {
    pub alerts: Vec<Alert>,
    pub status: ProductStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Safe,
    Warning,
}

impl OverallStatus {
    /// Safe only when quality is strictly above the threshold and the reading is normal
    pub fn assess(quality_score: f64, is_anomaly: bool) -> Self {
        if quality_score > SAFE_QUALITY_THRESHOLD && !is_anomaly {
            OverallStatus::Safe
        } else {
            OverallStatus::Warning
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Safe => write!(f, "Safe"),
            OverallStatus::Warning => write!(f, "Warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveWarning {
    pub days_from_now: u32,
    pub predicted_quality: f64,
    pub message: String,
}

impl PredictiveWarning {
    /// Warning for the earliest projected point below the safe threshold
    pub fn first_unsafe(timeline: &[TimelinePoint]) -> Option<Self> {
        timeline
            .iter()
            .find(|p| p.predicted_quality < SAFE_QUALITY_THRESHOLD)
            .map(|p| PredictiveWarning {
                days_from_now: p.days_from_now,
                predicted_quality: p.predicted_quality,
                message: predictive_warning(p.days_from_now),
            })
    }
}

/// Actions for a smart analysis report; never empty
pub fn smart_recommendations(quality_score: f64, anomaly: &AnomalyResult) -> Vec<String> {
    let mut recommendations = Vec::new();
    if quality_score < SAFE_QUALITY_THRESHOLD {
        recommendations.push(format!(
            "Quality declining: {}",
            quality_recommendation(quality_score)
        ));
    }
    if anomaly.is_anomaly {
        recommendations.push(anomaly.recommendation.clone());
    }
    if recommendations.is_empty() {
        recommendations.push("No action needed".to_string());
    }
    recommendations
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub humidity: f64,
    pub light_exposure: Option<f64>,
    pub vibration: Option<f64>,
    pub days_elapsed: f64,
}

/// Composite report for one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartAnalysis {
    pub product_id: i64,
    pub product_name: String,
    pub batch_number: String,
    pub analyzed_at: DateTime<Utc>,
    pub overall_status: OverallStatus,
    pub quality: QualityPrediction,
    pub anomaly: AnomalyResult,
    pub recommendations: Vec<String>,
    pub predictive_warning: Option<PredictiveWarning>,
    /// First points of the projected timeline
    pub timeline: Vec<TimelinePoint>,
    pub current_conditions: CurrentConditions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Active,
    NotTrained,
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Availability::Active => write!(f, "active"),
            Availability::NotTrained => write!(f, "not_trained"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub name: String,
    pub kind: String,
    pub status: Availability,
    pub state: ModelState,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// Outcome of [`InferenceService::load_models`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAvailability {
    pub quality: bool,
    pub anomaly: bool,
}

pub struct InferenceService {
    quality: Arc<QualityModel>,
    anomaly: Arc<AnomalyModel>,
    policy: AlertPolicy,
    preparer: FeaturePreparer,
    store: Arc<dyn MonitoringStore>,
    metrics: InferenceMetrics,
    logger: StructuredLogger,
}

impl InferenceService {
    pub fn new(config: &PipelineConfig, store: Arc<dyn MonitoringStore>) -> Self {
        Self::with_models(
            Arc::new(QualityModel::new(config)),
            Arc::new(AnomalyModel::new(config)),
            FeaturePreparer::with_min_records(config.min_training_records),
            store,
        )
    }

    pub fn with_models(
        quality: Arc<QualityModel>,
        anomaly: Arc<AnomalyModel>,
        preparer: FeaturePreparer,
        store: Arc<dyn MonitoringStore>,
    ) -> Self {
        Self {
            quality,
            anomaly,
            policy: AlertPolicy::default(),
            preparer,
            store,
            metrics: InferenceMetrics::new(),
            logger: StructuredLogger::new("quality-inference"),
        }
    }

    pub fn with_policy(mut self, policy: AlertPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn quality_model(&self) -> &Arc<QualityModel> {
        &self.quality
    }

    pub fn anomaly_model(&self) -> &Arc<AnomalyModel> {
        &self.anomaly
    }

    pub fn store(&self) -> &Arc<dyn MonitoringStore> {
        &self.store
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    pub fn predict_quality(&self, features: &QualityFeatures) -> Result<QualityAssessment> {
        let prediction = self.timed_quality_prediction(features)?;
        let alert = self.policy.evaluate_quality(&prediction);
        if let Some(alert) = &alert {
            self.record_alert(None, alert);
        }
        Ok(QualityAssessment {
            recommendation: quality_recommendation(prediction.quality_score).to_string(),
            prediction,
            alert,
        })
    }

    pub fn predict_degradation_timeline(
        &self,
        conditions: &StorageConditions,
        days_ahead: u32,
    ) -> Result<TimelineReport> {
        let timeline = self.quality.predict_timeline(conditions, days_ahead)?;
        self.metrics.inc_predictions(QUALITY_MODEL);
        let warning = timeline
            .iter()
            .any(|p| p.predicted_quality < SAFE_QUALITY_THRESHOLD)
            .then(|| TIMELINE_WARNING.to_string());
        Ok(TimelineReport { timeline, warning })
    }

    pub fn detect_anomaly(
        &self,
        temperature: f64,
        humidity: f64,
        light_exposure: Option<f64>,
        vibration: Option<f64>,
    ) -> Result<AnomalyResult> {
        let reading = SensorReading {
            light_exposure,
            vibration,
            ..SensorReading::new(temperature, humidity)
        };
        self.timed_detection(&reading)
    }

    /// Alerts for a reading and the product status they lead to
    pub fn evaluate_alerts(
        &self,
        reading: &SensorReading,
        current_status: ProductStatus,
    ) -> Result<AlertEvaluation> {
        let alerts = self.policy.evaluate(reading)?;
        let status = self.policy.derive_product_status(&alerts, current_status);
        Ok(AlertEvaluation { alerts, status })
    }

    /// Store a live reading, raise its alerts and update the product status
    pub fn ingest_reading(
        &self,
        product_id: i64,
        reading: SensorReading,
    ) -> Result<AlertEvaluation> {
        let product = self
            .store
            .product(product_id)
            .ok_or(InferenceError::ProductNotFound(product_id))?;
        let mut reading = reading.with_baseline_defaults();
        reading.recorded_at.get_or_insert_with(Utc::now);
        let evaluation = self.evaluate_alerts(&reading, product.status)?;

        self.store.append_reading(product_id, reading);
        self.store.append_alerts(product_id, &evaluation.alerts);
        for alert in &evaluation.alerts {
            self.record_alert(Some(product_id), alert);
        }
        if evaluation.status != product.status {
            self.store.update_product_status(product_id, evaluation.status);
            debug!(
                product_id = product_id,
                from = %product.status,
                to = %evaluation.status,
                "Product status changed"
            );
        }
        Ok(evaluation)
    }

    pub fn run_smart_analysis(&self, product_id: i64) -> Result<SmartAnalysis> {
        self.run_smart_analysis_at(product_id, Utc::now())
    }

    /// Smart analysis with an explicit clock, used for reproducible reports
    pub fn run_smart_analysis_at(
        &self,
        product_id: i64,
        now: DateTime<Utc>,
    ) -> Result<SmartAnalysis> {
        let product = self
            .store
            .product(product_id)
            .ok_or(InferenceError::ProductNotFound(product_id))?;
        let reading = self
            .store
            .latest_reading(product_id)
            .ok_or(InferenceError::NoSensorData(product_id))?;

        let days_elapsed = (now - product.manufacturing_date).num_days().max(0) as f64;
        let conditions = StorageConditions {
            temperature: reading.temperature,
            humidity: reading.humidity,
            ph: DEFAULT_PH,
            moisture: DEFAULT_MOISTURE,
            impurity: DEFAULT_IMPURITY,
            active_ingredient: DEFAULT_ACTIVE_INGREDIENT,
        };

        let quality = self.timed_quality_prediction(&conditions.at_day(days_elapsed))?;
        let anomaly = self.timed_detection(&reading)?;

        let overall_status = OverallStatus::assess(quality.quality_score, anomaly.is_anomaly);
        let recommendations = smart_recommendations(quality.quality_score, &anomaly);

        let mut timeline = self
            .quality
            .predict_timeline(&conditions, SMART_ANALYSIS_HORIZON_DAYS)?;
        let predictive_warning = PredictiveWarning::first_unsafe(&timeline);
        timeline.truncate(SMART_ANALYSIS_TIMELINE_POINTS);

        Ok(SmartAnalysis {
            product_id,
            product_name: product.name,
            batch_number: product.batch_number,
            analyzed_at: now,
            overall_status,
            quality,
            anomaly,
            recommendations,
            predictive_warning,
            timeline,
            current_conditions: CurrentConditions {
                temperature: reading.temperature,
                humidity: reading.humidity,
                light_exposure: reading.light_exposure,
                vibration: reading.vibration,
                days_elapsed,
            },
        })
    }

    /// Prepare, train and persist the quality model
    pub fn train_quality(&self, records: &[QualityRecord]) -> Result<QualityTrainingReport> {
        let result = self.preparer.prepare(records).and_then(|prepared| {
            self.logger.log_records_skipped(prepared.skipped, prepared.len());
            self.metrics.add_records_skipped(prepared.skipped);
            let report = self.quality.train(&prepared)?;
            self.quality.save()?;
            Ok(report)
        });
        self.metrics.inc_training_run(QUALITY_MODEL, result.is_ok());
        self.metrics.set_model_trained(QUALITY_MODEL, self.quality.is_trained());
        if let Ok(report) = &result {
            self.logger.log_model_trained(
                QUALITY_MODEL,
                &report.run_id,
                report.train_samples + report.test_samples,
            );
        }
        result
    }

    /// Train and persist the anomaly model
    pub fn train_anomaly(&self, readings: &[SensorReading]) -> Result<AnomalyTrainingReport> {
        let result = self.anomaly.train(readings).and_then(|report| {
            self.anomaly.save()?;
            Ok(report)
        });
        self.metrics.inc_training_run(ANOMALY_MODEL, result.is_ok());
        self.metrics.set_model_trained(ANOMALY_MODEL, self.anomaly.is_trained());
        if let Ok(report) = &result {
            self.logger.log_model_trained(ANOMALY_MODEL, &report.run_id, report.samples);
        }
        result
    }

    /// Train both models from the data currently in the store
    pub fn train_from_store(&self) -> Result<(QualityTrainingReport, AnomalyTrainingReport)> {
        let quality = self.train_quality(&self.store.quality_records())?;
        let anomaly = self.train_anomaly(&self.store.sensor_readings())?;
        Ok((quality, anomaly))
    }

    pub fn model_status(&self) -> Vec<ModelStatus> {
        let describe = |name: &str,
                        kind: &str,
                        description: &str,
                        state: ModelState,
                        run_id: Option<String>| {
            ModelStatus {
                name: name.to_string(),
                kind: kind.to_string(),
                status: if state.is_ready() {
                    Availability::Active
                } else {
                    Availability::NotTrained
                },
                state,
                description: description.to_string(),
                run_id,
            }
        };
        vec![
            describe(
                "Quality Degradation Predictor",
                "ml_prediction",
                "Predicts medicine quality based on storage conditions",
                self.quality.state(),
                self.quality.run_id(),
            ),
            describe(
                "Anomaly Detector",
                "anomaly_detection",
                "Detects unusual sensor readings",
                self.anomaly.state(),
                self.anomaly.run_id(),
            ),
        ]
    }

    /// Load both models from disk; a failed load leaves that model untrained
    pub fn load_models(&self) -> ModelAvailability {
        let availability = ModelAvailability {
            quality: self.quality.load(),
            anomaly: self.anomaly.load(),
        };
        self.logger.log_model_load(QUALITY_MODEL, availability.quality);
        self.logger.log_model_load(ANOMALY_MODEL, availability.anomaly);
        self.metrics.set_model_trained(QUALITY_MODEL, self.quality.is_trained());
        self.metrics.set_model_trained(ANOMALY_MODEL, self.anomaly.is_trained());
        availability
    }

    fn timed_quality_prediction(&self, features: &QualityFeatures) -> Result<QualityPrediction> {
        let start = Instant::now();
        let prediction = self.quality.predict(features)?;
        let latency = start.elapsed().as_secs_f64();
        self.metrics.observe_prediction_latency(latency);
        self.metrics.inc_predictions(QUALITY_MODEL);
        self.logger.log_quality_prediction(&prediction, latency);
        Ok(prediction)
    }

    fn timed_detection(&self, reading: &SensorReading) -> Result<AnomalyResult> {
        let start = Instant::now();
        let result = self.anomaly.detect_reading(reading)?;
        self.metrics.observe_prediction_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_predictions(ANOMALY_MODEL);
        if result.is_anomaly {
            self.metrics.inc_anomalies_detected();
            self.logger.log_anomaly(reading.product_id, &result);
        }
        Ok(result)
    }

    fn record_alert(&self, product_id: Option<i64>, alert: &Alert) {
        self.metrics.inc_alert(alert);
        self.logger.log_alert(product_id, alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Product, QualityStatus, Severity};
    use crate::store::{InMemoryStore, StoreSnapshot};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> (InferenceService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.insert_product(Product {
            id: 1,
            name: "Vaccine A".to_string(),
            batch_number: "VX-001".to_string(),
            manufacturing_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            status: ProductStatus::SafeVerified,
        });
        let config = PipelineConfig::with_model_dir(dir.path());
        (InferenceService::new(&config, store.clone()), store)
    }

    #[test]
    fn test_ingest_updates_status_and_stores_alerts() {
        let dir = TempDir::new().unwrap();
        let (service, store) = service(&dir);

        let evaluation = service
            .ingest_reading(1, SensorReading::new(5.0, 80.0))
            .unwrap();
        assert_eq!(evaluation.status, ProductStatus::Warning);
        assert_eq!(store.product(1).unwrap().status, ProductStatus::Warning);

        let evaluation = service
            .ingest_reading(1, SensorReading::new(30.0, 60.0))
            .unwrap();
        assert_eq!(evaluation.status, ProductStatus::Alert);

        let evaluation = service
            .ingest_reading(1, SensorReading::new(5.0, 90.0))
            .unwrap();
        assert_eq!(evaluation.status, ProductStatus::Alert);
        assert_eq!(store.alerts(1).len(), 3);
        assert_eq!(store.sensor_readings().len(), 3);
    }

    #[test]
    fn test_ingest_unknown_product() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service(&dir);
        assert!(matches!(
            service.ingest_reading(42, SensorReading::new(5.0, 60.0)),
            Err(InferenceError::ProductNotFound(42))
        ));
    }

    #[test]
    fn test_smart_analysis_error_paths() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service(&dir);
        assert!(matches!(
            service.run_smart_analysis(9),
            Err(InferenceError::ProductNotFound(9))
        ));
        assert!(matches!(
            service.run_smart_analysis(1),
            Err(InferenceError::NoSensorData(1))
        ));
    }

    #[test]
    fn test_untrained_models_report_not_trained() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service(&dir);

        let availability = service.load_models();
        assert!(!availability.quality);
        assert!(!availability.anomaly);

        let status = service.model_status();
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|s| s.status == Availability::NotTrained));
        assert!(matches!(
            service.detect_anomaly(5.0, 60.0, None, None),
            Err(InferenceError::ModelNotTrained { .. })
        ));
    }

    fn point(days_from_now: u32, predicted_quality: f64) -> TimelinePoint {
        TimelinePoint {
            days_from_now,
            predicted_quality,
            predicted_status: QualityStatus::Degraded,
        }
    }

    fn normal_result() -> AnomalyResult {
        AnomalyResult {
            is_anomaly: false,
            anomaly_score: 0.05,
            severity: Severity::Low,
            recommendation: "Conditions are normal".to_string(),
        }
    }

    #[test]
    fn test_ingested_reading_becomes_latest_after_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut snapshot_reading = SensorReading::new(5.0, 60.0);
        snapshot_reading.product_id = Some(1);
        snapshot_reading.recorded_at =
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let store = Arc::new(InMemoryStore::from_snapshot(StoreSnapshot {
            products: vec![Product {
                id: 1,
                name: "Vaccine A".to_string(),
                batch_number: "VX-001".to_string(),
                manufacturing_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                status: ProductStatus::SafeVerified,
            }],
            readings: vec![snapshot_reading],
            quality_records: Vec::new(),
        }));
        let config = PipelineConfig::with_model_dir(dir.path());
        let service = InferenceService::new(&config, store.clone());

        service
            .ingest_reading(1, SensorReading::new(30.0, 95.0))
            .unwrap();

        let latest = store.latest_reading(1).unwrap();
        assert_eq!(latest.temperature, 30.0);
        assert!(latest.recorded_at.is_some());
    }

    #[test]
    fn test_predictive_warning_uses_first_point_below_threshold() {
        let timeline = vec![
            point(0, 88.0),
            point(5, 74.0),
            point(10, 69.5),
            point(15, 40.0),
            point(20, 75.0),
        ];
        let warning = PredictiveWarning::first_unsafe(&timeline).unwrap();
        assert_eq!(warning.days_from_now, 10);
        assert_eq!(warning.predicted_quality, 69.5);
        assert_eq!(warning.message, "Quality may drop below safe levels in 10 days");

        // 70 itself is not below the threshold
        assert!(PredictiveWarning::first_unsafe(&[point(0, 90.0), point(5, 70.0)]).is_none());
        assert!(PredictiveWarning::first_unsafe(&[]).is_none());
    }

    #[test]
    fn test_overall_status_boundary_at_threshold() {
        assert_eq!(OverallStatus::assess(70.0, false), OverallStatus::Warning);
        assert_eq!(OverallStatus::assess(70.1, false), OverallStatus::Safe);
        assert_eq!(OverallStatus::assess(95.0, true), OverallStatus::Warning);

        assert_eq!(
            smart_recommendations(70.0, &normal_result()),
            vec!["No action needed".to_string()]
        );
    }

    #[test]
    fn test_smart_recommendations_combine_quality_and_anomaly() {
        let declining = smart_recommendations(45.0, &normal_result());
        assert_eq!(
            declining,
            vec![
                "Quality declining: Quality is poor. \
                 Recommend immediate inspection and potential disposal."
                    .to_string()
            ]
        );

        let anomalous = AnomalyResult {
            is_anomaly: true,
            anomaly_score: -0.4,
            severity: Severity::High,
            recommendation: "Check environmental conditions".to_string(),
        };
        let both = smart_recommendations(60.0, &anomalous);
        assert_eq!(both.len(), 2);
        assert!(both[0].starts_with("Quality declining: Quality is degrading."));
        assert_eq!(both[1], "Check environmental conditions");
    }
}
