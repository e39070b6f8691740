//! Isolation forest for unsupervised outlier scoring
//!
//! Scores follow the `score_samples` convention: values lie in `[-1, 0)` and
//! more negative means easier to isolate. The decision offset is the
//! `contamination` quantile of the training scores.

use super::metrics::percentile;
use crate::error::{InferenceError, Result};
use ndarray::ArrayView2;
use rand::{seq::index, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsolationParams {
    pub n_estimators: usize,
    pub max_samples: usize,
    /// Expected fraction of outliers in the training set
    pub contamination: f64,
    pub random_state: u64,
}

impl Default for IsolationParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.1,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum IsolationNode {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<IsolationNode>,
}

impl IsolationTree {
    fn grow(
        x: ArrayView2<'_, f64>,
        samples: &[usize],
        height_limit: usize,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow_node(x, samples, 0, height_limit, rng);
        tree
    }

    fn grow_node(
        &mut self,
        x: ArrayView2<'_, f64>,
        samples: &[usize],
        depth: usize,
        height_limit: usize,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let index = self.nodes.len();
        self.nodes.push(IsolationNode::Leaf {
            size: samples.len(),
        });
        if depth >= height_limit || samples.len() <= 1 {
            return index;
        }

        // (feature, min, max) for every feature that still varies
        let candidates: Vec<(usize, f64, f64)> = (0..x.ncols())
            .filter_map(|feature| {
                let (lo, hi) = samples.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), &i| (lo.min(x[[i, feature]]), hi.max(x[[i, feature]])),
                );
                (hi > lo).then_some((feature, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return index;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .copied()
            .partition(|&i| x[[i, feature]] <= threshold);

        let left = self.grow_node(x, &left, depth + 1, height_limit, rng);
        let right = self.grow_node(x, &right, depth + 1, height_limit, rng);
        self.nodes[index] = IsolationNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        index
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[index] {
                IsolationNode::Leaf { size } => return depth + average_path_length(*size),
                IsolationNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
pub(crate) fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    params: IsolationParams,
    n_features: usize,
    subsample_size: usize,
    trees: Vec<IsolationTree>,
    offset: f64,
}

impl IsolationForest {
    pub fn fit(x: ArrayView2<'_, f64>, params: IsolationParams) -> Result<Self> {
        let n = x.nrows();
        if n == 0 || x.ncols() == 0 {
            return Err(InferenceError::InvalidInput(
                "isolation forest needs a non-empty training matrix".to_string(),
            ));
        }
        if params.n_estimators == 0 {
            return Err(InferenceError::InvalidInput(
                "isolation forest needs at least one estimator".to_string(),
            ));
        }
        if !(params.contamination > 0.0 && params.contamination <= 0.5) {
            return Err(InferenceError::InvalidInput(format!(
                "contamination must lie in (0, 0.5], got {}",
                params.contamination
            )));
        }

        let subsample_size = params.max_samples.clamp(1, n);
        let height_limit = (subsample_size.max(2) as f64).log2().ceil() as usize;
        let mut seeder = ChaCha8Rng::seed_from_u64(params.random_state);
        let trees = (0..params.n_estimators)
            .map(|_| {
                let mut rng = ChaCha8Rng::seed_from_u64(seeder.gen());
                let samples = index::sample(&mut rng, n, subsample_size).into_vec();
                IsolationTree::grow(x, &samples, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            params,
            n_features: x.ncols(),
            subsample_size,
            trees,
            offset: 0.0,
        };
        let training_scores: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|row| forest.score_row(&row.to_vec()))
            .collect();
        forest.offset = percentile(&training_scores, params.contamination * 100.0);
        Ok(forest)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn contamination(&self) -> f64 {
        self.params.contamination
    }

    /// Raw anomaly score in `[-1, 0)`; lower is more anomalous
    pub fn score_row(&self, row: &[f64]) -> f64 {
        let mean_depth: f64 =
            self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64;
        let norm = average_path_length(self.subsample_size);
        if norm <= 0.0 {
            return -1.0;
        }
        -(2f64.powf(-mean_depth / norm))
    }

    /// Score shifted by the training offset; negative means outlier
    pub fn decision_row(&self, row: &[f64]) -> f64 {
        self.score_row(row) - self.offset
    }

    pub fn is_outlier(&self, row: &[f64]) -> bool {
        self.score_row(row) < self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn cluster(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, 2), |(i, j)| {
            let wobble = ((i * 7 + j * 3) % 11) as f64 / 10.0;
            if j == 0 {
                5.0 + wobble
            } else {
                60.0 + wobble * 5.0
            }
        })
    }

    #[test]
    fn test_far_point_is_outlier() {
        let x = cluster(100);
        let forest = IsolationForest::fit(x.view(), IsolationParams::default()).unwrap();

        let far = forest.score_row(&[40.0, 5.0]);
        let near = forest.score_row(&[5.5, 62.5]);
        assert!(far < near);
        assert!(forest.is_outlier(&[40.0, 5.0]));
        assert!(!forest.is_outlier(&[5.5, 62.5]));
        assert!((-1.0..0.0).contains(&far));
    }

    #[test]
    fn test_contamination_fraction_of_training_flagged() {
        let x = cluster(200);
        let forest = IsolationForest::fit(x.view(), IsolationParams::default()).unwrap();
        let flagged = x
            .rows()
            .into_iter()
            .filter(|row| forest.is_outlier(&row.to_vec()))
            .count();
        assert!(flagged <= 20, "flagged {} of 200", flagged);
    }

    #[test]
    fn test_same_seed_same_scores() {
        let x = cluster(50);
        let a = IsolationForest::fit(x.view(), IsolationParams::default()).unwrap();
        let b = IsolationForest::fit(x.view(), IsolationParams::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.score_row(&[9.0, 70.0]), b.score_row(&[9.0, 70.0]));
    }

    #[test]
    fn test_average_path_length_base_cases() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(10));
    }

    #[test]
    fn test_rejects_bad_contamination() {
        let x = cluster(20);
        let params = IsolationParams {
            contamination: 0.9,
            ..IsolationParams::default()
        };
        assert!(IsolationForest::fit(x.view(), params).is_err());
    }
}
