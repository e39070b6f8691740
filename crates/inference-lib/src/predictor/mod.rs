//! Quality degradation prediction

mod features;
mod output;
mod quality;

pub use features::{days_elapsed, FeaturePreparer, PreparedData, FALLBACK_AGE_DAYS, FEATURE_NAMES};
pub use output::{
    predictive_warning, quality_recommendation, SAFE_QUALITY_THRESHOLD, TIMELINE_WARNING,
};
pub use quality::{
    Evaluation, FeatureImportance, QualityModel, QualityTrainingReport, QUALITY_MODEL,
    TIMELINE_STEP_DAYS,
};
