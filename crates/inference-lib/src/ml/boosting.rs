//! Multinomial gradient boosting classifier
//!
//! One regression tree per class per stage is fitted to the softmax
//! pseudo-residuals, with leaves set by a single Newton step on the
//! multinomial deviance.

use super::tree::{RegressionTree, TreeParams};
use crate::error::{InferenceError, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    params: BoostingParams,
    n_classes: usize,
    n_features: usize,
    /// Log prior per class
    init: Vec<f64>,
    /// `stages[m][k]` is the tree for class `k` at stage `m`
    stages: Vec<Vec<RegressionTree>>,
}

impl GradientBoostingClassifier {
    /// Fit on class indices in `0..n_classes`; every class must occur in `y`
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
        params: BoostingParams,
    ) -> Result<Self> {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            return Err(InferenceError::InvalidInput(format!(
                "classifier needs matching non-empty x/y, got {} rows and {} labels",
                n,
                y.len()
            )));
        }
        if n_classes == 0 || y.iter().any(|&c| c >= n_classes) {
            return Err(InferenceError::InvalidInput(format!(
                "class labels must lie in 0..{}",
                n_classes
            )));
        }

        let mut counts = vec![0usize; n_classes];
        for &c in y {
            counts[c] += 1;
        }
        if counts.iter().any(|&c| c == 0) {
            return Err(InferenceError::InvalidInput(
                "every class must be represented in the training labels".to_string(),
            ));
        }

        let mut model = Self {
            params,
            n_classes,
            n_features: x.ncols(),
            init: counts
                .iter()
                .map(|&c| (c as f64 / n as f64).ln())
                .collect(),
            stages: Vec::new(),
        };
        if n_classes == 1 {
            return Ok(model);
        }

        let tree_params = TreeParams::with_max_depth(params.max_depth);
        let samples: Vec<usize> = (0..n).collect();
        let k_factor = (n_classes - 1) as f64 / n_classes as f64;
        let mut raw: Vec<Vec<f64>> = vec![model.init.clone(); n];
        let mut residuals = vec![0.0; n];

        model.stages.reserve(params.n_estimators);
        for _ in 0..params.n_estimators {
            let probabilities: Vec<Vec<f64>> = raw.iter().map(|r| softmax(r)).collect();
            let mut stage = Vec::with_capacity(n_classes);
            for k in 0..n_classes {
                for i in 0..n {
                    let target = if y[i] == k { 1.0 } else { 0.0 };
                    residuals[i] = target - probabilities[i][k];
                }
                let r = &residuals;
                let tree = RegressionTree::fit(x, r, &samples, &tree_params, |leaf| {
                    let numerator: f64 = leaf.iter().map(|&i| r[i]).sum();
                    let denominator: f64 =
                        leaf.iter().map(|&i| r[i].abs() * (1.0 - r[i].abs())).sum();
                    if denominator.abs() < 1e-150 {
                        0.0
                    } else {
                        k_factor * numerator / denominator
                    }
                });
                for (i, row) in raw.iter_mut().enumerate() {
                    row[k] += params.learning_rate * tree.predict_at(x, i);
                }
                stage.push(tree);
            }
            model.stages.push(stage);
        }

        Ok(model)
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Class probabilities for one feature vector; sums to 1.0
    pub fn predict_proba_row(&self, row: &[f64]) -> Vec<f64> {
        let mut raw = self.init.clone();
        for stage in &self.stages {
            for (k, tree) in stage.iter().enumerate() {
                raw[k] += self.params.learning_rate * tree.predict_row(row);
            }
        }
        softmax(&raw)
    }

    /// Most probable class index (lowest index wins ties)
    pub fn predict_row(&self, row: &[f64]) -> usize {
        argmax(&self.predict_proba_row(row))
    }
}

fn softmax(raw: &[f64]) -> Vec<f64> {
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = raw.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|v| v / sum).collect()
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
