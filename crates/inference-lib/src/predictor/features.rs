//! Feature preparation for quality model training
//!
//! Turns historical inspection records into the seven-column training matrix
//! plus the regression (score) and classification (status) targets. Rows
//! that cannot produce every feature are dropped and counted.

use crate::config::MIN_TRAINING_RECORDS;
use crate::error::{InferenceError, Result};
use crate::models::{QualityFeatures, QualityRecord, QualityStatus};
use chrono::Duration;
use ndarray::Array2;

/// Training column order
pub const FEATURE_NAMES: [&str; 7] = [
    "storage_temperature",
    "storage_humidity",
    "ph_level",
    "moisture_content",
    "days_elapsed",
    "impurity_percentage",
    "active_ingredient_concentration",
];

/// Assumed age at inspection when neither an inspection nor an import
/// timestamp is recorded
pub const FALLBACK_AGE_DAYS: i64 = 30;

/// Training matrix and targets produced by [`FeaturePreparer::prepare`]
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub x: Array2<f64>,
    pub y_score: Vec<f64>,
    pub y_class: Vec<QualityStatus>,
    pub feature_names: Vec<String>,
    /// Records dropped for failing the completeness contract
    pub skipped: usize,
}

impl PreparedData {
    pub fn len(&self) -> usize {
        self.y_score.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_score.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FeaturePreparer {
    min_records: usize,
}

impl Default for FeaturePreparer {
    fn default() -> Self {
        Self::new()
    }
}

impl FeaturePreparer {
    pub fn new() -> Self {
        Self {
            min_records: MIN_TRAINING_RECORDS,
        }
    }

    pub fn with_min_records(min_records: usize) -> Self {
        Self { min_records }
    }

    /// Build the training set, failing if too few records survive
    pub fn prepare(&self, records: &[QualityRecord]) -> Result<PreparedData> {
        let mut rows: Vec<f64> = Vec::with_capacity(records.len() * FEATURE_NAMES.len());
        let mut y_score = Vec::with_capacity(records.len());
        let mut y_class = Vec::with_capacity(records.len());

        for record in records {
            if let Some((features, status)) = Self::extract(record) {
                rows.extend(features.to_vec());
                y_score.push(status.score());
                y_class.push(status);
            }
        }

        let valid = y_score.len();
        if valid < self.min_records {
            return Err(InferenceError::InsufficientData {
                valid,
                required: self.min_records,
            });
        }

        let x = Array2::from_shape_vec((valid, FEATURE_NAMES.len()), rows)
            .map_err(|e| InferenceError::InvalidInput(e.to_string()))?;

        Ok(PreparedData {
            x,
            y_score,
            y_class,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            skipped: records.len() - valid,
        })
    }

    /// Features and label of one record, or `None` if it is incomplete
    pub fn extract(record: &QualityRecord) -> Option<(QualityFeatures, QualityStatus)> {
        let status = QualityStatus::parse(record.quality_status.as_deref()?)?;
        let features = QualityFeatures {
            temperature: record.storage_temperature?,
            humidity: record.storage_humidity?,
            ph: record.ph_level?,
            moisture: record.moisture_content?,
            days_elapsed: days_elapsed(record)?,
            impurity: record.impurity_percentage?,
            active_ingredient: record.active_ingredient_concentration?,
        };
        features
            .to_vec()
            .iter()
            .all(|v| v.is_finite())
            .then_some((features, status))
    }
}

/// Whole days between manufacture and inspection, never negative
///
/// Falls back to the import timestamp, then to a fixed assumed age.
/// Records without a manufacturing date have no derivable age.
pub fn days_elapsed(record: &QualityRecord) -> Option<f64> {
    let manufactured = record.manufacturing_date?;
    let observed = record
        .inspection_date
        .or(record.imported_at)
        .unwrap_or(manufactured + Duration::days(FALLBACK_AGE_DAYS));
    Some((observed - manufactured).num_days().max(0) as f64)
}
