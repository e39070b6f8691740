//! CART regression tree used by both tree ensembles
//!
//! Splits minimize squared error on the supplied targets. The value stored in
//! each leaf comes from a caller-provided function so that the random forest
//! (mean target) and gradient boosting (Newton step) can share one builder.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Minimum squared-error reduction (per sample) for a split to be kept
const MIN_GAIN_PER_SAMPLE: f64 = 1e-12;

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl TreeParams {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Fitted regression tree stored as a flat node vector (root at index 0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    n_features: usize,
    /// Unnormalized squared-error reduction per feature
    importances: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Builder<'a, F> {
    x: ArrayView2<'a, f64>,
    y: &'a [f64],
    params: &'a TreeParams,
    leaf_value: F,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl RegressionTree {
    /// Grow a tree on the rows of `x` listed in `samples`
    ///
    /// `samples` may contain repeated indices (bootstrap draws). `leaf_value`
    /// receives the sample indices that reached a leaf.
    pub fn fit<F>(
        x: ArrayView2<'_, f64>,
        y: &[f64],
        samples: &[usize],
        params: &TreeParams,
        leaf_value: F,
    ) -> Self
    where
        F: Fn(&[usize]) -> f64,
    {
        let mut builder = Builder {
            x: x.view(),
            y,
            params,
            leaf_value,
            nodes: Vec::new(),
            importances: vec![0.0; x.ncols()],
        };
        builder.grow(samples, 0);
        Self {
            nodes: builder.nodes,
            n_features: x.ncols(),
            importances: builder.importances,
        }
    }

    /// Grow a tree whose leaves hold the mean target of their samples
    pub fn fit_mean(
        x: ArrayView2<'_, f64>,
        y: &[f64],
        samples: &[usize],
        params: &TreeParams,
    ) -> Self {
        Self::fit(x, y, samples, params, |leaf| {
            leaf.iter().map(|&i| y[i]).sum::<f64>() / leaf.len() as f64
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    /// Predict for a feature vector of the fitted arity
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.predict_with(|feature| row[feature])
    }

    /// Predict for row `i` of a matrix without copying it
    pub fn predict_at(&self, x: ArrayView2<'_, f64>, i: usize) -> f64 {
        self.predict_with(|feature| x[[i, feature]])
    }

    fn predict_with(&self, value_of: impl Fn(usize) -> f64) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if value_of(*feature) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

impl<'a, F> Builder<'a, F>
where
    F: Fn(&[usize]) -> f64,
{
    fn grow(&mut self, samples: &[usize], depth: usize) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });

        let split = if depth < self.params.max_depth
            && samples.len() >= self.params.min_samples_split
            && !self.is_pure(samples)
        {
            self.best_split(samples)
        } else {
            None
        };

        match split {
            None => {
                self.nodes[index] = Node::Leaf {
                    value: (self.leaf_value)(samples),
                };
            }
            Some(split) => {
                self.importances[split.feature] += split.gain;
                let (left, right): (Vec<usize>, Vec<usize>) = samples
                    .iter()
                    .copied()
                    .partition(|&i| self.x[[i, split.feature]] <= split.threshold);
                let left = self.grow(&left, depth + 1);
                let right = self.grow(&right, depth + 1);
                self.nodes[index] = Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                };
            }
        }
        index
    }

    fn is_pure(&self, samples: &[usize]) -> bool {
        let first = self.y[samples[0]];
        samples.iter().all(|&i| self.y[i] == first)
    }

    fn best_split(&self, samples: &[usize]) -> Option<Split> {
        let n = samples.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total: f64 = samples.iter().map(|&i| self.y[i]).sum();
        let parent = total * total / n as f64;
        let min_gain = MIN_GAIN_PER_SAMPLE * n as f64;

        let mut best: Option<Split> = None;
        let mut order = samples.to_vec();
        for feature in 0..self.x.ncols() {
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left_sum = 0.0;
            for pos in 1..n {
                left_sum += self.y[order[pos - 1]];
                if pos < min_leaf || n - pos < min_leaf {
                    continue;
                }
                let lo = self.x[[order[pos - 1], feature]];
                let hi = self.x[[order[pos], feature]];
                if hi <= lo {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / pos as f64
                    + right_sum * right_sum / (n - pos) as f64
                    - parent;
                if gain > best.map_or(min_gain, |b| b.gain) {
                    let mut threshold = lo + (hi - lo) / 2.0;
                    if threshold >= hi {
                        threshold = lo;
                    }
                    best = Some(Split {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_step_function_is_learned() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = [0.0, 0.0, 0.0, 100.0, 100.0, 100.0];
        let samples: Vec<usize> = (0..6).collect();
        let tree = RegressionTree::fit_mean(x.view(), &y, &samples, &TreeParams::default());

        assert_eq!(tree.predict_row(&[2.5]), 0.0);
        assert_eq!(tree.predict_row(&[11.5]), 100.0);
        // single split: root plus two leaves
        assert_eq!(tree.n_nodes(), 3);
        assert!(tree.importances()[0] > 0.0);
    }

    #[test]
    fn test_threshold_is_midpoint() {
        let x = array![[0.0], [4.0]];
        let y = [1.0, 3.0];
        let tree = RegressionTree::fit_mean(x.view(), &y, &[0, 1], &TreeParams::default());
        assert_eq!(tree.predict_row(&[2.0]), 1.0);
        assert_eq!(tree.predict_row(&[2.0001]), 3.0);
    }

    #[test]
    fn test_depth_zero_is_single_leaf() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = [3.0, 6.0, 9.0];
        let tree =
            RegressionTree::fit_mean(x.view(), &y, &[0, 1, 2], &TreeParams::with_max_depth(0));
        assert_eq!(tree.n_nodes(), 1);
        assert!((tree.predict_row(&[100.0]) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_features_do_not_split() {
        let x = array![[5.0, 1.0], [5.0, 1.0], [5.0, 1.0]];
        let y = [1.0, 2.0, 3.0];
        let tree = RegressionTree::fit_mean(x.view(), &y, &[0, 1, 2], &TreeParams::default());
        assert_eq!(tree.n_nodes(), 1);
    }

    #[test]
    fn test_predict_at_matches_predict_row() {
        let x = array![[1.0, 9.0], [2.0, 8.0], [3.0, 1.0], [4.0, 0.0]];
        let y = [1.0, 1.0, 5.0, 5.0];
        let tree = RegressionTree::fit_mean(x.view(), &y, &[0, 1, 2, 3], &TreeParams::default());
        for i in 0..4 {
            let row = x.row(i).to_vec();
            assert_eq!(tree.predict_at(x.view(), i), tree.predict_row(&row));
        }
    }
}
