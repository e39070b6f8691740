//! Estimators backing the quality and anomaly models
//!
//! Everything here is deterministic for a given seed and serializes with
//! serde so fitted state can be persisted as model artifacts.

pub mod boosting;
pub mod forest;
pub mod isolation;
pub mod metrics;
pub mod scaler;
pub mod tree;

pub use boosting::{BoostingParams, GradientBoostingClassifier};
pub use forest::{ForestParams, RandomForestRegressor};
pub use isolation::{IsolationForest, IsolationParams};
pub use metrics::{accuracy, percentile, r2_score, train_test_split};
pub use scaler::StandardScaler;
