//! Pipeline configuration shared by the monitor and the CLI

use crate::ml::{BoostingParams, ForestParams, IsolationParams};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Minimum number of valid rows required to train either model
pub const MIN_TRAINING_RECORDS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the persisted model artifacts
    pub model_dir: PathBuf,
    /// Seed for the train/test shuffle
    pub split_seed: u64,
    /// Fraction of prepared rows held out for evaluation
    pub test_fraction: f64,
    pub min_training_records: usize,
    pub forest: ForestParams,
    pub boosting: BoostingParams,
    pub isolation: IsolationParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            split_seed: 42,
            test_fraction: 0.2,
            min_training_records: MIN_TRAINING_RECORDS,
            forest: ForestParams::default(),
            boosting: BoostingParams::default(),
            isolation: IsolationParams::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_model_dir(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            ..Self::default()
        }
    }
}
