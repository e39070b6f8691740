//! Bootstrap-aggregated regression forest

use super::tree::{RegressionTree, TreeParams};
use crate::error::{InferenceError, Result};
use ndarray::ArrayView2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub random_state: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            random_state: 42,
        }
    }
}

/// Random forest regressor: mean of bootstrap-trained CART trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    params: ForestParams,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn fit(x: ArrayView2<'_, f64>, y: &[f64], params: ForestParams) -> Result<Self> {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            return Err(InferenceError::InvalidInput(format!(
                "forest needs matching non-empty x/y, got {} rows and {} targets",
                n,
                y.len()
            )));
        }
        if params.n_estimators == 0 {
            return Err(InferenceError::InvalidInput(
                "forest needs at least one estimator".to_string(),
            ));
        }

        let tree_params = TreeParams::with_max_depth(params.max_depth);
        let mut seeder = ChaCha8Rng::seed_from_u64(params.random_state);
        let trees = (0..params.n_estimators)
            .map(|_| {
                let mut rng = ChaCha8Rng::seed_from_u64(seeder.gen());
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit_mean(x, y, &bootstrap, &tree_params)
            })
            .collect();

        Ok(Self { params, trees })
    }

    pub fn n_features(&self) -> usize {
        self.trees.first().map_or(0, RegressionTree::n_features)
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
        sum / self.trees.len() as f64
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Vec<f64> {
        (0..x.nrows())
            .map(|i| {
                let sum: f64 = self.trees.iter().map(|t| t.predict_at(x, i)).sum();
                sum / self.trees.len() as f64
            })
            .collect()
    }

    /// Mean per-tree normalized impurity importances, normalized to sum to 1
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_features()];
        for tree in &self.trees {
            let tree_total: f64 = tree.importances().iter().sum();
            if tree_total <= 0.0 {
                continue;
            }
            for (acc, imp) in totals.iter_mut().zip(tree.importances()) {
                *acc += imp / tree_total;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }
}
