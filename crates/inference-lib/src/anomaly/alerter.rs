//! Threshold alerting for storage conditions
//!
//! Handles:
//! - Temperature and humidity band checks on live sensor readings
//! - Product status transitions driven by alert severity
//! - Quality degradation alerts raised from model predictions

use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, Result};
use crate::models::{ProductStatus, QualityPrediction, SensorReading, Severity};
use crate::predictor::{quality_recommendation, SAFE_QUALITY_THRESHOLD};

/// Alert classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Temperature,
    Humidity,
    QualityDegradation,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::Temperature => write!(f, "temperature"),
            AlertType::Humidity => write!(f, "humidity"),
            AlertType::QualityDegradation => write!(f, "quality_degradation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
}

/// Safe and tolerated bands for storage conditions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Safe temperature band in °C
    pub temperature_min: f64,
    pub temperature_max: f64,
    /// Outside this band a temperature excursion is high severity
    pub temperature_tolerance_min: f64,
    pub temperature_tolerance_max: f64,
    /// Safe relative humidity band in %
    pub humidity_min: f64,
    pub humidity_max: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            temperature_min: 2.0,
            temperature_max: 8.0,
            temperature_tolerance_min: 0.0,
            temperature_tolerance_max: 25.0,
            humidity_min: 45.0,
            humidity_max: 75.0,
        }
    }
}

impl AlertThresholds {
    pub fn temperature_out_of_band(&self, temperature: f64) -> bool {
        temperature < self.temperature_min || temperature > self.temperature_max
    }

    pub fn humidity_out_of_band(&self, humidity: f64) -> bool {
        humidity < self.humidity_min || humidity > self.humidity_max
    }
}

/// Stateless alert policy
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertPolicy {
    thresholds: AlertThresholds,
}

impl AlertPolicy {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Alerts for one reading; temperature is reported before humidity
    pub fn evaluate(&self, reading: &SensorReading) -> Result<Vec<Alert>> {
        validate_reading(reading)?;
        let t = &self.thresholds;
        let mut alerts = Vec::with_capacity(2);

        if t.temperature_out_of_band(reading.temperature) {
            let severity = if reading.temperature < t.temperature_tolerance_min
                || reading.temperature > t.temperature_tolerance_max
            {
                Severity::High
            } else {
                Severity::Medium
            };
            alerts.push(Alert {
                alert_type: AlertType::Temperature,
                severity,
                message: format!(
                    "Temperature anomaly detected: {:?}°C (Safe range: {:?}-{:?}°C)",
                    reading.temperature, t.temperature_min, t.temperature_max
                ),
            });
        }

        if t.humidity_out_of_band(reading.humidity) {
            alerts.push(Alert {
                alert_type: AlertType::Humidity,
                severity: Severity::Medium,
                message: format!(
                    "Humidity anomaly detected: {:?}% (Safe range: {:?}-{:?}%)",
                    reading.humidity, t.humidity_min, t.humidity_max
                ),
            });
        }

        Ok(alerts)
    }

    /// Fold alerts into the product status
    ///
    /// High and critical alerts force `Alert`. Medium alerts move the product
    /// to `Warning` but never downgrade an existing `Alert`. Low alerts leave
    /// the status unchanged.
    pub fn derive_product_status(&self, alerts: &[Alert], current: ProductStatus) -> ProductStatus {
        alerts.iter().fold(current, |status, alert| match alert.severity {
            Severity::High | Severity::Critical => ProductStatus::Alert,
            Severity::Medium if status != ProductStatus::Alert => ProductStatus::Warning,
            Severity::Medium | Severity::Low => status,
        })
    }

    /// Quality degradation alert for a prediction below the safe threshold
    pub fn evaluate_quality(&self, prediction: &QualityPrediction) -> Option<Alert> {
        let score = prediction.quality_score;
        if score >= SAFE_QUALITY_THRESHOLD {
            return None;
        }
        let severity = if score < 50.0 {
            Severity::High
        } else {
            Severity::Medium
        };
        Some(Alert {
            alert_type: AlertType::QualityDegradation,
            severity,
            message: format!(
                "AI Prediction: Quality score is {:.1}. {}",
                score,
                quality_recommendation(score)
            ),
        })
    }
}

fn validate_reading(reading: &SensorReading) -> Result<()> {
    let fields = [
        ("temperature", Some(reading.temperature)),
        ("humidity", Some(reading.humidity)),
        ("light_exposure", reading.light_exposure),
        ("vibration", reading.vibration),
    ];
    for (name, value) in fields {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(InferenceError::InvalidReading(format!(
                    "{} is not a finite number ({})",
                    name, v
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DegradationRisk, QualityStatus};
    use std::collections::BTreeMap;

    fn prediction(score: f64) -> QualityPrediction {
        QualityPrediction {
            quality_score: score,
            quality_status: QualityStatus::Degraded,
            confidence: BTreeMap::from([(QualityStatus::Degraded, 1.0)]),
            degradation_risk: DegradationRisk::from_score(score),
        }
    }

    #[test]
    fn test_hot_reading_raises_high_alert() {
        let policy = AlertPolicy::default();
        let alerts = policy.evaluate(&SensorReading::new(30.0, 60.0)).unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Temperature);
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(
            alerts[0].message,
            "Temperature anomaly detected: 30.0°C (Safe range: 2.0-8.0°C)"
        );
        assert_eq!(
            policy.derive_product_status(&alerts, ProductStatus::SafeVerified),
            ProductStatus::Alert
        );
    }

    #[test]
    fn test_mild_excursion_is_medium() {
        let policy = AlertPolicy::default();
        let alerts = policy.evaluate(&SensorReading::new(12.0, 60.0)).unwrap();
        assert_eq!(alerts[0].severity, Severity::Medium);

        let alerts = policy.evaluate(&SensorReading::new(-0.5, 60.0)).unwrap();
        assert_eq!(alerts[0].severity, Severity::High);
    }

    #[test]
    fn test_humid_reading_never_downgrades_alert() {
        let policy = AlertPolicy::default();
        let alerts = policy.evaluate(&SensorReading::new(5.0, 80.0)).unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Humidity);
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert_eq!(
            policy.derive_product_status(&alerts, ProductStatus::SafeVerified),
            ProductStatus::Warning
        );
        assert_eq!(
            policy.derive_product_status(&alerts, ProductStatus::Alert),
            ProductStatus::Alert
        );
    }

    #[test]
    fn test_both_bands_violated_in_order() {
        let policy = AlertPolicy::default();
        let alerts = policy.evaluate(&SensorReading::new(10.0, 20.0)).unwrap();
        let kinds: Vec<AlertType> = alerts.iter().map(|a| a.alert_type).collect();
        assert_eq!(kinds, vec![AlertType::Temperature, AlertType::Humidity]);
    }

    #[test]
    fn test_boundaries_are_safe() {
        let policy = AlertPolicy::default();
        assert!(policy.evaluate(&SensorReading::new(2.0, 45.0)).unwrap().is_empty());
        assert!(policy.evaluate(&SensorReading::new(8.0, 75.0)).unwrap().is_empty());
    }

    #[test]
    fn test_non_finite_reading_is_rejected() {
        let policy = AlertPolicy::default();
        assert!(matches!(
            policy.evaluate(&SensorReading::new(f64::NAN, 60.0)),
            Err(InferenceError::InvalidReading(_))
        ));
        assert!(policy
            .evaluate(&SensorReading::new(5.0, 60.0).with_vibration(f64::INFINITY))
            .is_err());
    }

    #[test]
    fn test_no_alerts_keeps_status() {
        let policy = AlertPolicy::default();
        assert_eq!(
            policy.derive_product_status(&[], ProductStatus::Warning),
            ProductStatus::Warning
        );
    }

    #[test]
    fn test_quality_alert_severity() {
        let policy = AlertPolicy::default();
        assert!(policy.evaluate_quality(&prediction(70.0)).is_none());
        assert_eq!(
            policy.evaluate_quality(&prediction(60.0)).unwrap().severity,
            Severity::Medium
        );
        assert_eq!(
            policy.evaluate_quality(&prediction(45.0)).unwrap().severity,
            Severity::High
        );
        let poor = policy.evaluate_quality(&prediction(20.0)).unwrap();
        assert_eq!(poor.severity, Severity::High);
        assert_eq!(poor.alert_type, AlertType::QualityDegradation);
        assert_eq!(
            poor.message,
            "AI Prediction: Quality score is 20.0. \
             Critical quality level. Do not distribute. Quarantine immediately."
        );
    }
}
