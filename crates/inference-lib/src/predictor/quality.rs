//! Quality degradation model
//!
//! Pairs a random forest regressor (quality score) with a boosted
//! classifier (quality status), both fitted on standardized features. The
//! scaler and both estimators form one bundle that is trained, persisted,
//! loaded and swapped as a unit.

use super::features::{PreparedData, FEATURE_NAMES};
use crate::config::PipelineConfig;
use crate::error::{InferenceError, Result};
use crate::lifecycle::{ModelSlot, ModelState};
use crate::ml::{
    accuracy, r2_score, train_test_split, BoostingParams, ForestParams,
    GradientBoostingClassifier, RandomForestRegressor, StandardScaler,
};
use crate::models::{
    DegradationRisk, QualityFeatures, QualityPrediction, QualityStatus, StorageConditions,
    TimelinePoint,
};
use crate::store::{new_run_id, ArtifactRole, ArtifactStore, LoadedArtifact};
use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name used in errors, logs and metrics
pub const QUALITY_MODEL: &str = "quality";

/// Spacing of degradation timeline points in days
pub const TIMELINE_STEP_DAYS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassifierArtifact {
    /// Class for each output index of the classifier
    classes: Vec<QualityStatus>,
    model: GradientBoostingClassifier,
}

#[derive(Debug)]
struct QualityBundle {
    run_id: String,
    scaler: StandardScaler,
    regressor: RandomForestRegressor,
    classifier: ClassifierArtifact,
}

impl QualityBundle {
    fn predict(&self, features: &QualityFeatures) -> Result<QualityPrediction> {
        let scaled = self.scaler.transform_row(&features.to_vec())?;
        let quality_score = self.regressor.predict_row(&scaled).clamp(0.0, 100.0);

        let proba = self.classifier.model.predict_proba_row(&scaled);
        let best = crate::ml::boosting::argmax(&proba);
        let confidence: BTreeMap<QualityStatus, f64> = self
            .classifier
            .classes
            .iter()
            .copied()
            .zip(proba)
            .collect();

        Ok(QualityPrediction {
            quality_score,
            quality_status: self.classifier.classes[best],
            confidence,
            degradation_risk: DegradationRisk::from_score(quality_score),
        })
    }

    fn evaluate(
        &self,
        x: ArrayView2<'_, f64>,
        y_score: &[f64],
        y_class: &[QualityStatus],
    ) -> Result<Evaluation> {
        let scaled = self.scaler.transform(x)?;
        let predicted_scores = self.regressor.predict(scaled.view());
        let predicted_classes: Vec<QualityStatus> = scaled
            .rows()
            .into_iter()
            .map(|row| self.classifier.classes[self.classifier.model.predict_row(&row.to_vec())])
            .collect();

        Ok(Evaluation {
            r2_score: r2_score(y_score, &predicted_scores),
            accuracy: accuracy(y_class, &predicted_classes),
            samples: y_score.len(),
        })
    }
}

/// Held-out metrics for a fitted bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub r2_score: f64,
    pub accuracy: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Summary returned by [`QualityModel::train`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityTrainingReport {
    pub run_id: String,
    pub r2_score: f64,
    pub accuracy: f64,
    pub train_samples: usize,
    pub test_samples: usize,
    /// Input records dropped during feature preparation
    pub skipped_records: usize,
    pub classes: Vec<QualityStatus>,
    /// Three most important regression features, descending
    pub top_features: Vec<FeatureImportance>,
}

/// Quality score and status predictor with an explicit lifecycle
#[derive(Debug)]
pub struct QualityModel {
    store: ArtifactStore,
    forest: ForestParams,
    boosting: BoostingParams,
    split_seed: u64,
    test_fraction: f64,
    min_records: usize,
    slot: ModelSlot<QualityBundle>,
}

impl QualityModel {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            store: ArtifactStore::new(config.model_dir.clone()),
            forest: config.forest,
            boosting: config.boosting,
            split_seed: config.split_seed,
            test_fraction: config.test_fraction,
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

    /// Training run that produced the installed bundle
    pub fn run_id(&self) -> Option<String> {
        self.slot.snapshot().map(|b| b.run_id.clone())
    }

    pub fn artifact_store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Fit scaler, regressor and classifier on an 80/20 split and install
    /// the result, replacing any previous bundle
    pub fn train(&self, prepared: &PreparedData) -> Result<QualityTrainingReport> {
        let n = prepared.len();
        if n < self.min_records {
            return Err(InferenceError::InsufficientData {
                valid: n,
                required: self.min_records,
            });
        }
        if prepared.x.nrows() != n || prepared.y_class.len() != n {
            return Err(InferenceError::InvalidInput(format!(
                "prepared data has {} rows, {} scores and {} labels",
                prepared.x.nrows(),
                n,
                prepared.y_class.len()
            )));
        }
        if prepared.x.ncols() != FEATURE_NAMES.len() {
            return Err(InferenceError::FeatureMismatch {
                expected: FEATURE_NAMES.join(", "),
                got: prepared.feature_names.join(", "),
            });
        }

        let (train_idx, test_idx) = train_test_split(n, self.test_fraction, self.split_seed);
        let x_train = prepared.x.select(Axis(0), &train_idx);
        let y_score_train: Vec<f64> = train_idx.iter().map(|&i| prepared.y_score[i]).collect();
        let y_class_train: Vec<QualityStatus> =
            train_idx.iter().map(|&i| prepared.y_class[i]).collect();

        let classes: Vec<QualityStatus> = y_class_train
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let class_index: BTreeMap<QualityStatus, usize> =
            classes.iter().enumerate().map(|(i, c)| (*c, i)).collect();
        let y_index: Vec<usize> = y_class_train.iter().map(|c| class_index[c]).collect();

        let scaler = StandardScaler::fit(x_train.view())?;
        let x_train_scaled = scaler.transform(x_train.view())?;
        let regressor =
            RandomForestRegressor::fit(x_train_scaled.view(), &y_score_train, self.forest)?;
        let classifier = GradientBoostingClassifier::fit(
            x_train_scaled.view(),
            &y_index,
            classes.len(),
            self.boosting,
        )?;

        let bundle = QualityBundle {
            run_id: new_run_id(),
            scaler,
            regressor,
            classifier: ClassifierArtifact {
                classes: classes.clone(),
                model: classifier,
            },
        };

        let x_test = prepared.x.select(Axis(0), &test_idx);
        let y_score_test: Vec<f64> = test_idx.iter().map(|&i| prepared.y_score[i]).collect();
        let y_class_test: Vec<QualityStatus> =
            test_idx.iter().map(|&i| prepared.y_class[i]).collect();
        let held_out = bundle.evaluate(x_test.view(), &y_score_test, &y_class_test)?;

        let mut top_features: Vec<FeatureImportance> = prepared
            .feature_names
            .iter()
            .zip(bundle.regressor.feature_importances())
            .map(|(name, importance)| FeatureImportance {
                feature: name.clone(),
                importance,
            })
            .collect();
        top_features.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        top_features.truncate(3);

        let report = QualityTrainingReport {
            run_id: bundle.run_id.clone(),
            r2_score: held_out.r2_score,
            accuracy: held_out.accuracy,
            train_samples: train_idx.len(),
            test_samples: test_idx.len(),
            skipped_records: prepared.skipped,
            classes,
            top_features,
        };

        self.slot.install(Arc::new(bundle), ModelState::Trained);
        info!(
            model = QUALITY_MODEL,
            run_id = %report.run_id,
            train_samples = report.train_samples,
            test_samples = report.test_samples,
            r2 = report.r2_score,
            accuracy = report.accuracy,
            "Quality model trained"
        );
        Ok(report)
    }

    /// Score the installed bundle against a labelled set without changing it
    pub fn evaluate(&self, prepared: &PreparedData) -> Result<Evaluation> {
        let bundle = self.bundle()?;
        bundle.evaluate(prepared.x.view(), &prepared.y_score, &prepared.y_class)
    }

    pub fn predict(&self, features: &QualityFeatures) -> Result<QualityPrediction> {
        validate_features(features)?;
        self.bundle()?.predict(features)
    }

    /// Predictions at days 0, 5, 10, ... strictly below `days_ahead`
    pub fn predict_timeline(
        &self,
        conditions: &StorageConditions,
        days_ahead: u32,
    ) -> Result<Vec<TimelinePoint>> {
        validate_features(&conditions.at_day(0.0))?;
        let bundle = self.bundle()?;
        (0..days_ahead)
            .step_by(TIMELINE_STEP_DAYS as usize)
            .map(|day| {
                let prediction = bundle.predict(&conditions.at_day(day as f64))?;
                Ok(TimelinePoint {
                    days_from_now: day,
                    predicted_quality: prediction.quality_score,
                    predicted_status: prediction.quality_status,
                })
            })
            .collect()
    }

    /// Write scaler, regressor and classifier artifacts for the installed bundle
    pub fn save(&self) -> Result<()> {
        let bundle = self.bundle()?;
        self.store
            .save(ArtifactRole::QualityScaler, &bundle.run_id, &bundle.scaler)?;
        self.store
            .save(ArtifactRole::QualityRegression, &bundle.run_id, &bundle.regressor)?;
        self.store.save(
            ArtifactRole::QualityClassification,
            &bundle.run_id,
            &bundle.classifier,
        )?;
        self.slot.mark_persisted(&bundle);
        debug!(model = QUALITY_MODEL, run_id = %bundle.run_id, "Quality model saved");
        Ok(())
    }

    /// Load and verify all three artifacts, installing them only if they
    /// belong to the same training run and agree on feature arity
    pub fn try_load(&self) -> Result<()> {
        let scaler: LoadedArtifact<StandardScaler> = self.store.load(ArtifactRole::QualityScaler)?;
        let regressor: LoadedArtifact<RandomForestRegressor> =
            self.store.load(ArtifactRole::QualityRegression)?;
        let classifier: LoadedArtifact<ClassifierArtifact> =
            self.store.load(ArtifactRole::QualityClassification)?;

        for (role, run_id) in [
            (ArtifactRole::QualityRegression, &regressor.run_id),
            (ArtifactRole::QualityClassification, &classifier.run_id),
        ] {
            if *run_id != scaler.run_id {
                return Err(InferenceError::persistence(
                    role.as_str(),
                    format!(
                        "training run {} does not match scaler run {}",
                        run_id, scaler.run_id
                    ),
                ));
            }
        }

        let expected = FEATURE_NAMES.len();
        for (role, arity) in [
            (ArtifactRole::QualityScaler, scaler.value.n_features()),
            (ArtifactRole::QualityRegression, regressor.value.n_features()),
            (
                ArtifactRole::QualityClassification,
                classifier.value.model.n_features(),
            ),
        ] {
            if arity != expected {
                return Err(InferenceError::persistence(
                    role.as_str(),
                    format!("fitted on {} features, expected {}", arity, expected),
                ));
            }
        }
        let classes = &classifier.value.classes;
        if classes.is_empty() || classes.len() != classifier.value.model.n_classes() {
            return Err(InferenceError::persistence(
                ArtifactRole::QualityClassification.as_str(),
                format!(
                    "{} class labels for {} classifier outputs",
                    classes.len(),
                    classifier.value.model.n_classes()
                ),
            ));
        }

        let bundle = QualityBundle {
            run_id: scaler.run_id,
            scaler: scaler.value,
            regressor: regressor.value,
            classifier: classifier.value,
        };
        info!(model = QUALITY_MODEL, run_id = %bundle.run_id, "Quality model loaded");
        self.slot.install(Arc::new(bundle), ModelState::Loaded);
        Ok(())
    }

    /// Availability-first load: `false` means the model stays as it was
    pub fn load(&self) -> bool {
        match self.try_load() {
            Ok(()) => true,
            Err(e) => {
                warn!(model = QUALITY_MODEL, error = %e, "Quality model not loaded");
                false
            }
        }
    }

    fn bundle(&self) -> Result<Arc<QualityBundle>> {
        self.slot.snapshot().ok_or(InferenceError::ModelNotTrained {
            model: QUALITY_MODEL,
        })
    }
}

fn validate_features(features: &QualityFeatures) -> Result<()> {
    match features
        .to_vec()
        .iter()
        .zip(FEATURE_NAMES)
        .find(|(v, _)| !v.is_finite())
    {
        Some((value, name)) => Err(InferenceError::InvalidReading(format!(
            "{} is not a finite number ({})",
            name, value
        ))),
        None => Ok(()),
    }
}
