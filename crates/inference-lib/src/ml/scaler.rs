//! Per-feature standardization

use crate::error::{InferenceError, Result};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Deviations below this are treated as constant features
const MIN_STD: f64 = 1e-12;

/// Zero-mean, unit-variance scaler fitted on training rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on the rows of `x` using the population standard deviation
    pub fn fit(x: ArrayView2<'_, f64>) -> Result<Self> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(InferenceError::InvalidInput(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }
        let n = x.nrows() as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for column in x.axis_iter(Axis(1)) {
            let mu = column.sum() / n;
            let var = column.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            mean.push(mu);
            scale.push(if std < MIN_STD { 1.0 } else { std });
        }
        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Scale a single feature vector
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.n_features() {
            return Err(InferenceError::InvalidInput(format!(
                "scaler fitted on {} features, got {}",
                self.n_features(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (mu, s))| (v - mu) / s)
            .collect())
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(InferenceError::InvalidInput(format!(
                "scaler fitted on {} features, got {}",
                self.n_features(),
                x.ncols()
            )));
        }
        let mut out = x.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (mu, s) = (self.mean[j], self.scale[j]);
            column.mapv_inplace(|v| (v - mu) / s);
        }
        Ok(out)
    }
}
