//! Core data models for the quality inference pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Baseline light exposure substituted when a reading omits it
pub const BASELINE_LIGHT_EXPOSURE: f64 = 50.0;

/// Baseline vibration substituted when a reading omits it
pub const BASELINE_VIBRATION: f64 = 0.5;

/// Ground-truth quality label of a historical inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityStatus {
    Counterfeit,
    Degraded,
    Good,
}

impl QualityStatus {
    /// Regression target used when training the quality score estimator
    pub fn score(&self) -> f64 {
        match self {
            QualityStatus::Good => 100.0,
            QualityStatus::Degraded => 50.0,
            QualityStatus::Counterfeit => 0.0,
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "Good" => Some(QualityStatus::Good),
            "Degraded" => Some(QualityStatus::Degraded),
            "Counterfeit" => Some(QualityStatus::Counterfeit),
            _ => None,
        }
    }
}

impl std::fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityStatus::Good => write!(f, "Good"),
            QualityStatus::Degraded => write!(f, "Degraded"),
            QualityStatus::Counterfeit => write!(f, "Counterfeit"),
        }
    }
}

/// Historical inspection record pulled from the data store at training time
///
/// Every field is optional on the wire; completeness is checked by the
/// feature preparer, which drops incomplete rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityRecord {
    #[serde(default)]
    pub storage_temperature: Option<f64>,
    #[serde(default)]
    pub storage_humidity: Option<f64>,
    #[serde(default)]
    pub ph_level: Option<f64>,
    #[serde(default)]
    pub moisture_content: Option<f64>,
    #[serde(default)]
    pub impurity_percentage: Option<f64>,
    #[serde(default)]
    pub active_ingredient_concentration: Option<f64>,
    #[serde(default)]
    pub manufacturing_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub inspection_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub imported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quality_status: Option<String>,
}

/// Environmental sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(default)]
    pub light_exposure: Option<f64>,
    #[serde(default)]
    pub vibration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl SensorReading {
    pub fn new(temperature: f64, humidity: f64) -> Self {
        Self {
            product_id: None,
            temperature,
            humidity,
            light_exposure: None,
            vibration: None,
            recorded_at: None,
        }
    }

    pub fn with_light_exposure(mut self, light_exposure: f64) -> Self {
        self.light_exposure = Some(light_exposure);
        self
    }

    pub fn with_vibration(mut self, vibration: f64) -> Self {
        self.vibration = Some(vibration);
        self
    }

    /// Fill absent optional channels with the "normal" baseline
    pub fn with_baseline_defaults(mut self) -> Self {
        self.light_exposure.get_or_insert(BASELINE_LIGHT_EXPOSURE);
        self.vibration.get_or_insert(BASELINE_VIBRATION);
        self
    }
}

/// The seven inputs of the quality model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityFeatures {
    pub temperature: f64,
    pub humidity: f64,
    pub ph: f64,
    pub moisture: f64,
    pub days_elapsed: f64,
    pub impurity: f64,
    pub active_ingredient: f64,
}

impl QualityFeatures {
    /// Feature vector in training column order
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.temperature,
            self.humidity,
            self.ph,
            self.moisture,
            self.days_elapsed,
            self.impurity,
            self.active_ingredient,
        ]
    }
}

/// Storage conditions held constant while projecting a degradation timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageConditions {
    pub temperature: f64,
    pub humidity: f64,
    pub ph: f64,
    pub moisture: f64,
    pub impurity: f64,
    pub active_ingredient: f64,
}

impl StorageConditions {
    pub fn at_day(&self, days_elapsed: f64) -> QualityFeatures {
        QualityFeatures {
            temperature: self.temperature,
            humidity: self.humidity,
            ph: self.ph,
            moisture: self.moisture,
            days_elapsed,
            impurity: self.impurity,
            active_ingredient: self.active_ingredient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradationRisk {
    High,
    Low,
}

impl DegradationRisk {
    pub fn from_score(score: f64) -> Self {
        if score < 50.0 {
            DegradationRisk::High
        } else {
            DegradationRisk::Low
        }
    }
}

/// Output of the quality model for a single sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityPrediction {
    pub quality_score: f64,
    pub quality_status: QualityStatus,
    /// Probability per class seen in training; sums to 1.0
    pub confidence: BTreeMap<QualityStatus, f64>,
    pub degradation_risk: DegradationRisk,
}

impl QualityPrediction {
    /// Highest class probability
    pub fn max_confidence(&self) -> f64 {
        self.confidence.values().copied().fold(0.0, f64::max)
    }
}

/// One step of a projected degradation timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub days_from_now: u32,
    pub predicted_quality: f64,
    pub predicted_status: QualityStatus,
}

/// Ordinal severity shared by anomaly results and alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Output of the anomaly model for a single reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub is_anomaly: bool,
    /// Isolation score; more negative means more anomalous
    pub anomaly_score: f64,
    pub severity: Severity,
    pub recommendation: String,
}

/// Product lifecycle status driven by the alert policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductStatus {
    #[serde(rename = "Safe & Verified")]
    SafeVerified,
    Warning,
    Alert,
}

impl Default for ProductStatus {
    fn default() -> Self {
        ProductStatus::SafeVerified
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductStatus::SafeVerified => write!(f, "Safe & Verified"),
            ProductStatus::Warning => write!(f, "Warning"),
            ProductStatus::Alert => write!(f, "Alert"),
        }
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Safe & Verified" | "safe" => Ok(ProductStatus::SafeVerified),
            "Warning" | "warning" => Ok(ProductStatus::Warning),
            "Alert" | "alert" => Ok(ProductStatus::Alert),
            other => Err(format!("unknown product status '{}'", other)),
        }
    }
}

/// Tracked product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub batch_number: String,
    pub manufacturing_date: DateTime<Utc>,
    #[serde(default)]
    pub status: ProductStatus,
}
