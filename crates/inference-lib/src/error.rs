//! Error taxonomy for the inference pipeline

use thiserror::Error;

/// Errors surfaced by feature preparation, training, scoring and persistence
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Fewer valid training rows than the minimum viable training set
    #[error("insufficient training data: {valid} valid records, need at least {required}")]
    InsufficientData { valid: usize, required: usize },

    /// predict/detect invoked before a model was trained or loaded
    #[error("{model} model is not trained")]
    ModelNotTrained { model: &'static str },

    /// Optional-feature arity differs from the layout used at training time
    #[error("feature mismatch: model expects [{expected}], got [{got}]")]
    FeatureMismatch { expected: String, got: String },

    /// Non-finite or missing required numeric field
    #[error("invalid reading: {0}")]
    InvalidReading(String),

    /// Missing, corrupt or inconsistent model artifact
    #[error("persistence failure for artifact '{role}': {reason}")]
    Persistence { role: String, reason: String },

    #[error("product {0} not found")]
    ProductNotFound(i64),

    #[error("no sensor data available for product {0}")]
    NoSensorData(i64),

    /// Structurally invalid arguments (shape mismatches, empty inputs)
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl InferenceError {
    pub(crate) fn persistence(role: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        InferenceError::Persistence {
            role: role.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InferenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = InferenceError::InsufficientData {
            valid: 4,
            required: 10,
        };
        assert_eq!(
            err.to_string(),
            "insufficient training data: 4 valid records, need at least 10"
        );

        let err = InferenceError::persistence("quality-scaler", "checksum mismatch");
        assert!(err.to_string().contains("quality-scaler"));
        assert!(err.to_string().contains("checksum mismatch"));
    }
}
