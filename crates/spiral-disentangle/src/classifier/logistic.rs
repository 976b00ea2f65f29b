// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Multinomial logistic regression fitted by full-batch gradient descent.

use super::{
    ensure_fit_inputs, ensure_predict_width, normalize_importances, not_fitted, ClassEncoding,
    FeatureImportanceClassifier,
};
use crate::matrix::mean_std;
use crate::{MetricsError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use tracing::debug;

#[derive(Clone, Debug)]
struct Fitted {
    encoding: ClassEncoding,
    means: Array1<f64>,
    scales: Array1<f64>,
    /// `[n_features, n_classes]` weights on standardized inputs.
    weights: Array2<f64>,
    bias: Array1<f64>,
}

/// L2-regularised softmax regression on standardized features.
///
/// The penalty follows the usual inverse-strength convention: the objective
/// is `C · Σ log-loss + ½‖W‖²`.
#[derive(Clone, Debug)]
pub struct LogisticRegression {
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    fitted: Option<Fitted>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-6,
            fitted: None,
        }
    }
}

impl LogisticRegression {
    pub fn new(c: f64) -> Self {
        Self {
            c,
            ..Self::default()
        }
    }

    fn standardize(fitted: &Fitted, features: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut z = features.to_owned();
        for mut row in z.rows_mut() {
            for ((v, m), s) in row.iter_mut().zip(&fitted.means).zip(&fitted.scales) {
                *v = (*v - m) / s;
            }
        }
        z
    }

    /// Row-wise softmax probabilities of `z · W + b`.
    fn probabilities(z: &Array2<f64>, weights: &Array2<f64>, bias: &Array1<f64>) -> Array2<f64> {
        let mut logits = z.dot(weights);
        for mut row in logits.rows_mut() {
            row += bias;
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|v| (v - max).exp());
            let total = row.sum();
            row /= total;
        }
        logits
    }
}

impl FeatureImportanceClassifier for LogisticRegression {
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: ArrayView1<'_, i64>) -> Result<()> {
        ensure_fit_inputs(features, labels)?;
        if !(self.c > 0.0) {
            return Err(MetricsError::InvalidArgument(format!(
                "inverse regularisation strength must be > 0, got {}",
                self.c
            )));
        }
        let encoding = ClassEncoding::fit(labels);
        let classes = encoding.encode(labels);
        let (n, d) = features.dim();
        let k = encoding.len();

        let (means, scales): (Vec<f64>, Vec<f64>) = features
            .axis_iter(Axis(1))
            .map(|col| {
                let (mean, std) = mean_std(col);
                (mean, if std > 0.0 { std } else { 1.0 })
            })
            .unzip();
        let mut fitted = Fitted {
            encoding,
            means: Array1::from(means),
            scales: Array1::from(scales),
            weights: Array2::zeros((d, k)),
            bias: Array1::zeros(k),
        };
        if k < 2 {
            self.fitted = Some(fitted);
            return Ok(());
        }

        let z = Self::standardize(&fitted, features);
        let mut onehot = Array2::<f64>::zeros((n, k));
        for (s, &c) in classes.iter().enumerate() {
            onehot[[s, c]] = 1.0;
        }
        let lambda = 1.0 / (self.c * n as f64);
        let step = 1.0 / (0.5 * (d as f64 + 1.0) + lambda);

        let mut iterations = 0;
        for _ in 0..self.max_iter {
            iterations += 1;
            let proba = Self::probabilities(&z, &fitted.weights, &fitted.bias);
            let residual = proba - &onehot;
            let grad_w = z.t().dot(&residual) / n as f64 + &fitted.weights * lambda;
            let grad_b = residual.sum_axis(Axis(0)) / n as f64;
            let norm = grad_w
                .iter()
                .chain(grad_b.iter())
                .fold(0.0f64, |acc, g| acc.max(g.abs()));
            fitted.weights.scaled_add(-step, &grad_w);
            fitted.bias.scaled_add(-step, &grad_b);
            if norm < self.tol {
                break;
            }
        }
        debug!(iterations, classes = k, features = d, "logistic regression fitted");
        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<i64>> {
        let fitted = self.fitted.as_ref().ok_or_else(not_fitted)?;
        ensure_predict_width(features, fitted.means.len())?;
        if fitted.encoding.len() < 2 {
            return Ok(Array1::from_elem(features.nrows(), fitted.encoding.decode(0)));
        }
        let z = Self::standardize(fitted, features);
        let proba = Self::probabilities(&z, &fitted.weights, &fitted.bias);
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                let class = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (c, &p)| {
                        if p > best.1 {
                            (c, p)
                        } else {
                            best
                        }
                    })
                    .0;
                fitted.encoding.decode(class)
            })
            .collect())
    }

    /// Absolute standardized coefficients summed over classes, normalized to 1.
    fn feature_importances(&self) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(not_fitted)?;
        let magnitudes = fitted
            .weights
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|w| w.abs()).sum::<f64>())
            .collect();
        Ok(normalize_importances(magnitudes))
    }
}
