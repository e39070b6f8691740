//! Environmental anomaly detection
//!
//! An isolation forest over standardized sensor channels. The channel layout
//! (temperature and humidity, plus light exposure and vibration when the
//! training readings carry them) is fixed at training time and persisted with
//! the model; detection must supply exactly that layout.

use super::alerter::AlertThresholds;
use crate::config::PipelineConfig;
use crate::error::{InferenceError, Result};
use crate::lifecycle::{ModelSlot, ModelState};
use crate::ml::{IsolationForest, IsolationParams, StandardScaler};
use crate::models::{
    AnomalyResult, SensorReading, Severity, BASELINE_LIGHT_EXPOSURE, BASELINE_VIBRATION,
};
use crate::store::{new_run_id, ArtifactRole, ArtifactStore, LoadedArtifact};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ANOMALY_MODEL: &str = "anomaly";

/// Scores above this are low severity
pub const LOW_SEVERITY_SCORE: f64 = -0.1;
/// Scores above this (and at most [`LOW_SEVERITY_SCORE`]) are medium severity
pub const MEDIUM_SEVERITY_SCORE: f64 = -0.3;

/// Which optional channels the detector was trained with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureLayout {
    pub light_exposure: bool,
    pub vibration: bool,
}

impl FeatureLayout {
    /// Include an optional channel if any reading supplies it
    pub fn from_readings(readings: &[SensorReading]) -> Self {
        Self {
            light_exposure: readings.iter().any(|r| r.light_exposure.is_some()),
            vibration: readings.iter().any(|r| r.vibration.is_some()),
        }
    }

    pub fn of(light_exposure: Option<f64>, vibration: Option<f64>) -> Self {
        Self {
            light_exposure: light_exposure.is_some(),
            vibration: vibration.is_some(),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names = vec!["temperature", "humidity"];
        if self.light_exposure {
            names.push("light_exposure");
        }
        if self.vibration {
            names.push("vibration");
        }
        names
    }

    pub fn arity(&self) -> usize {
        2 + usize::from(self.light_exposure) + usize::from(self.vibration)
    }

    /// Training row: absent layout channels take their baseline value
    fn training_row(&self, reading: &SensorReading) -> Vec<f64> {
        let mut row = vec![reading.temperature, reading.humidity];
        if self.light_exposure {
            row.push(reading.light_exposure.unwrap_or(BASELINE_LIGHT_EXPOSURE));
        }
        if self.vibration {
            row.push(reading.vibration.unwrap_or(BASELINE_VIBRATION));
        }
        row
    }
}

impl std::fmt::Display for FeatureLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.names().join(", "))
    }
}

/// Severity bucket for an isolation score
pub fn anomaly_severity(score: f64) -> Severity {
    if score > LOW_SEVERITY_SCORE {
        Severity::Low
    } else if score > MEDIUM_SEVERITY_SCORE {
        Severity::Medium
    } else {
        Severity::High
    }
}

/// Corrective advice for a detection result
pub fn recommendation(is_anomaly: bool, temperature: f64, humidity: f64) -> String {
    if !is_anomaly {
        return "Conditions are normal".to_string();
    }
    let bands = AlertThresholds::default();
    let mut advice = Vec::new();
    if bands.temperature_out_of_band(temperature) {
        advice.push(format!(
            "Adjust temperature (current: {:?}°C, safe: 2-8°C)",
            temperature
        ));
    }
    if bands.humidity_out_of_band(humidity) {
        advice.push(format!(
            "Adjust humidity (current: {:?}%, safe: 45-75%)",
            humidity
        ));
    }
    if advice.is_empty() {
        "Check environmental conditions".to_string()
    } else {
        advice.join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DetectorArtifact {
    layout: FeatureLayout,
    forest: IsolationForest,
}

#[derive(Debug)]
struct AnomalyBundle {
    run_id: String,
    scaler: StandardScaler,
    detector: DetectorArtifact,
}

/// Summary returned by [`AnomalyModel::train`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyTrainingReport {
    pub run_id: String,
    pub samples: usize,
    /// Training readings the fitted forest flags as outliers
    pub anomalies: usize,
    pub normal: usize,
    pub features: Vec<String>,
}

/// Isolation-forest detector with an explicit lifecycle
#[derive(Debug)]
pub struct AnomalyModel {
    store: ArtifactStore,
    params: IsolationParams,
    min_records: usize,
    slot: ModelSlot<AnomalyBundle>,
}

impl AnomalyModel {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            store: ArtifactStore::new(config.model_dir.clone()),
            params: config.isolation,
            min_records: config.min_training_records,
            slot: ModelSlot::default(),
        }
    }

    pub fn state(&self) -> ModelState {
        self.slot.state()
    }

    pub fn is_trained(&self) -> bool {
        self.slot.snapshot().is_some()
    }

    pub fn run_id(&self) -> Option<String> {
        self.slot.snapshot().map(|b| b.run_id.clone())
    }

    /// Channel layout of the installed detector
    pub fn layout(&self) -> Option<FeatureLayout> {
        self.slot.snapshot().map(|b| b.detector.layout)
    }

    pub fn train(&self, readings: &[SensorReading]) -> Result<AnomalyTrainingReport> {
        if readings.len() < self.min_records {
            return Err(InferenceError::InsufficientData {
                valid: readings.len(),
                required: self.min_records,
            });
        }
        for reading in readings {
            validate_channels(
                reading.temperature,
                reading.humidity,
                reading.light_exposure,
                reading.vibration,
            )?;
        }

        let layout = FeatureLayout::from_readings(readings);
        let rows: Vec<f64> = readings
            .iter()
            .flat_map(|r| layout.training_row(r))
            .collect();
        let x = Array2::from_shape_vec((readings.len(), layout.arity()), rows)
            .map_err(|e| InferenceError::InvalidInput(e.to_string()))?;

        let scaler = StandardScaler::fit(x.view())?;
        let scaled = scaler.transform(x.view())?;
        let forest = IsolationForest::fit(scaled.view(), self.params)?;
        let anomalies = scaled
            .rows()
            .into_iter()
            .filter(|row| forest.is_outlier(&row.to_vec()))
            .count();

        let bundle = AnomalyBundle {
            run_id: new_run_id(),
            scaler,
            detector: DetectorArtifact { layout, forest },
        };
        let report = AnomalyTrainingReport {
            run_id: bundle.run_id.clone(),
            samples: readings.len(),
            anomalies,
            normal: readings.len() - anomalies,
            features: layout.names().iter().map(|s| s.to_string()).collect(),
        };

        self.slot.install(Arc::new(bundle), ModelState::Trained);
        info!(
            model = ANOMALY_MODEL,
            run_id = %report.run_id,
            samples = report.samples,
            anomalies = report.anomalies,
            features = %layout,
            "Anomaly model trained"
        );
        Ok(report)
    }

    /// Score one reading; optional channels must match the trained layout
    pub fn detect(
        &self,
        temperature: f64,
        humidity: f64,
        light_exposure: Option<f64>,
        vibration: Option<f64>,
    ) -> Result<AnomalyResult> {
        validate_channels(temperature, humidity, light_exposure, vibration)?;
        let bundle = self.slot.snapshot().ok_or(InferenceError::ModelNotTrained {
            model: ANOMALY_MODEL,
        })?;

        let layout = bundle.detector.layout;
        let supplied = FeatureLayout::of(light_exposure, vibration);
        if supplied != layout {
            return Err(InferenceError::FeatureMismatch {
                expected: layout.to_string(),
                got: supplied.to_string(),
            });
        }

        let mut row = vec![temperature, humidity];
        row.extend(light_exposure);
        row.extend(vibration);
        let scaled = bundle.scaler.transform_row(&row)?;

        let forest = &bundle.detector.forest;
        let anomaly_score = forest.score_row(&scaled);
        let is_anomaly = forest.is_outlier(&scaled);
        Ok(AnomalyResult {
            is_anomaly,
            anomaly_score,
            severity: anomaly_severity(anomaly_score),
            recommendation: recommendation(is_anomaly, temperature, humidity),
        })
    }

    pub fn detect_reading(&self, reading: &SensorReading) -> Result<AnomalyResult> {
        self.detect(
            reading.temperature,
            reading.humidity,
            reading.light_exposure,
            reading.vibration,
        )
    }

    pub fn save(&self) -> Result<()> {
        let bundle = self.slot.snapshot().ok_or(InferenceError::ModelNotTrained {
            model: ANOMALY_MODEL,
        })?;
        self.store
            .save(ArtifactRole::AnomalyScaler, &bundle.run_id, &bundle.scaler)?;
        self.store
            .save(ArtifactRole::AnomalyModel, &bundle.run_id, &bundle.detector)?;
        self.slot.mark_persisted(&bundle);
        debug!(model = ANOMALY_MODEL, run_id = %bundle.run_id, "Anomaly model saved");
        Ok(())
    }

    pub fn try_load(&self) -> Result<()> {
        let scaler: LoadedArtifact<StandardScaler> = self.store.load(ArtifactRole::AnomalyScaler)?;
        let detector: LoadedArtifact<DetectorArtifact> =
            self.store.load(ArtifactRole::AnomalyModel)?;

        if detector.run_id != scaler.run_id {
            return Err(InferenceError::persistence(
                ArtifactRole::AnomalyModel.as_str(),
                format!(
                    "training run {} does not match scaler run {}",
                    detector.run_id, scaler.run_id
                ),
            ));
        }
        let expected = detector.value.layout.arity();
        for (role, arity) in [
            (ArtifactRole::AnomalyScaler, scaler.value.n_features()),
            (ArtifactRole::AnomalyModel, detector.value.forest.n_features()),
        ] {
            if arity != expected {
                return Err(InferenceError::persistence(
                    role.as_str(),
                    format!(
                        "fitted on {} features, layout [{}] needs {}",
                        arity, detector.value.layout, expected
                    ),
                ));
            }
        }

        let bundle = AnomalyBundle {
            run_id: scaler.run_id,
            scaler: scaler.value,
            detector: detector.value,
        };
        info!(
            model = ANOMALY_MODEL,
            run_id = %bundle.run_id,
            features = %bundle.detector.layout,
            "Anomaly model loaded"
        );
        self.slot.install(Arc::new(bundle), ModelState::Loaded);
        Ok(())
    }

    pub fn load(&self) -> bool {
        match self.try_load() {
            Ok(()) => true,
            Err(e) => {
                warn!(model = ANOMALY_MODEL, error = %e, "Anomaly model not loaded");
                false
            }
        }
    }
}

fn validate_channels(
    temperature: f64,
    humidity: f64,
    light_exposure: Option<f64>,
    vibration: Option<f64>,
) -> Result<()> {
    let channels = [
        ("temperature", Some(temperature)),
        ("humidity", Some(humidity)),
        ("light_exposure", light_exposure),
        ("vibration", vibration),
    ];
    match channels
        .iter()
        .find_map(|(name, v)| v.filter(|v| !v.is_finite()).map(|v| (name, v)))
    {
        Some((name, value)) => Err(InferenceError::InvalidReading(format!(
            "{} is not a finite number ({})",
            name, value
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Readings inside the safe band with a little deterministic jitter
    fn normal_readings(n: usize) -> Vec<SensorReading> {
        (0..n)
            .map(|i| {
                let t = ((i * 37) % 100) as f64 / 100.0;
                let h = ((i * 53) % 100) as f64 / 100.0;
                SensorReading::new(4.0 + 2.0 * t, 55.0 + 10.0 * h)
                    .with_light_exposure(45.0 + 10.0 * ((i * 13) % 10) as f64 / 10.0)
                    .with_vibration(0.4 + 0.2 * ((i * 7) % 10) as f64 / 10.0)
            })
            .collect()
    }

    fn model(dir: &TempDir) -> AnomalyModel {
        AnomalyModel::new(&PipelineConfig::with_model_dir(dir.path()))
    }

    #[test]
    fn test_severity_buckets() {
        assert_eq!(anomaly_severity(-0.05), Severity::Low);
        assert_eq!(anomaly_severity(-0.1), Severity::Medium);
        assert_eq!(anomaly_severity(-0.2), Severity::Medium);
        assert_eq!(anomaly_severity(-0.3), Severity::High);
        assert_eq!(anomaly_severity(-0.7), Severity::High);
    }

    #[test]
    fn test_recommendation_text() {
        assert_eq!(recommendation(false, 30.0, 90.0), "Conditions are normal");
        assert_eq!(
            recommendation(true, 25.0, 90.0),
            "Adjust temperature (current: 25.0°C, safe: 2-8°C); \
             Adjust humidity (current: 90.0%, safe: 45-75%)"
        );
        assert_eq!(recommendation(true, 5.0, 60.0), "Check environmental conditions");
    }

    #[test]
    fn test_layout_from_readings() {
        let readings = vec![
            SensorReading::new(5.0, 60.0),
            SensorReading::new(5.0, 60.0).with_vibration(0.3),
        ];
        let layout = FeatureLayout::from_readings(&readings);
        assert!(!layout.light_exposure);
        assert!(layout.vibration);
        assert_eq!(layout.arity(), 3);
        assert_eq!(layout.to_string(), "temperature, humidity, vibration");
    }

    #[test]
    fn test_detects_extreme_conditions() {
        let dir = TempDir::new().unwrap();
        let model = model(&dir);
        let report = model.train(&normal_readings(200)).unwrap();
        assert_eq!(report.samples, 200);
        assert_eq!(report.anomalies + report.normal, 200);
        assert_eq!(report.features.len(), 4);

        let hot = model.detect(25.0, 90.0, Some(100.0), Some(5.0)).unwrap();
        assert!(hot.is_anomaly);
        assert!(hot.recommendation.contains("Adjust temperature"));

        let normal = model.detect(5.5, 60.0, Some(50.0), Some(0.5)).unwrap();
        assert!(!normal.is_anomaly);
        assert_eq!(normal.recommendation, "Conditions are normal");
        assert!(hot.anomaly_score < normal.anomaly_score);
    }

    #[test]
    fn test_layout_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let model = model(&dir);
        model.train(&normal_readings(50)).unwrap();

        match model.detect(5.0, 60.0, None, Some(0.5)) {
            Err(InferenceError::FeatureMismatch { expected, got }) => {
                assert_eq!(expected, "temperature, humidity, light_exposure, vibration");
                assert_eq!(got, "temperature, humidity, vibration");
            }
            other => panic!("expected feature mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_training_guards() {
        let dir = TempDir::new().unwrap();
        let model = model(&dir);
        assert!(matches!(
            model.train(&normal_readings(9)),
            Err(InferenceError::InsufficientData { valid: 9, .. })
        ));

        let mut readings = normal_readings(20);
        readings[3].humidity = f64::NAN;
        assert!(matches!(
            model.train(&readings),
            Err(InferenceError::InvalidReading(_))
        ));
        assert!(!model.is_trained());
        assert!(matches!(
            model.detect(5.0, 60.0, None, None),
            Err(InferenceError::ModelNotTrained { model: "anomaly" })
        ));
    }

    #[test]
    fn test_save_load_preserves_layout_and_scores() {
        let dir = TempDir::new().unwrap();
        let trained = model(&dir);
        let readings: Vec<SensorReading> = normal_readings(40)
            .into_iter()
            .map(|mut r| {
                r.light_exposure = None;
                r
            })
            .collect();
        trained.train(&readings).unwrap();
        let before = trained.detect(7.0, 70.0, None, Some(0.9)).unwrap();
        trained.save().unwrap();

        let restored = model(&dir);
        assert!(restored.load());
        assert_eq!(restored.layout(), trained.layout());
        assert_eq!(restored.detect(7.0, 70.0, None, Some(0.9)).unwrap(), before);
    }

    #[test]
    fn test_partial_artifacts_leave_model_untrained() {
        let dir = TempDir::new().unwrap();
        let trained = model(&dir);
        trained.train(&normal_readings(30)).unwrap();
        trained.save().unwrap();
        std::fs::remove_file(trained.store.path_for(ArtifactRole::AnomalyScaler)).unwrap();

        let restored = model(&dir);
        assert!(!restored.load());
        assert_eq!(restored.state(), ModelState::Untrained);
    }
}
