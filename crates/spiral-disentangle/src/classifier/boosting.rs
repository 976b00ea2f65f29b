// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Gradient-boosted regression trees with a log-loss objective.

use super::tree::{DecisionTree, Presorted, Target, TreeConfig};
use super::{
    ensure_fit_inputs, ensure_predict_width, not_fitted, ClassEncoding,
    FeatureImportanceClassifier,
};
use crate::Result;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::trace;

const DENOMINATOR_FLOOR: f64 = 1e-150;

#[derive(Clone, Debug)]
struct Fitted {
    encoding: ClassEncoding,
    n_features: usize,
    /// Initial raw score per output column.
    init: Vec<f64>,
    /// `stages[m][k]` is the tree of stage `m` for output column `k`.
    stages: Vec<Vec<DecisionTree>>,
}

/// Boosted depth-limited trees, one per class and stage (a single tree per
/// stage for binary problems).
#[derive(Clone, Debug)]
pub struct GradientBoostingClassifier {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub seed: u64,
    fitted: Option<Fitted>,
}

impl GradientBoostingClassifier {
    pub fn new(seed: u64) -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            seed,
            fitted: None,
        }
    }

    fn raw_scores(fitted: &Fitted, row: ArrayView1<'_, f64>, learning_rate: f64) -> Vec<f64> {
        let mut raw = fitted.init.clone();
        for stage in &fitted.stages {
            for (k, tree) in stage.iter().enumerate() {
                raw[k] += learning_rate * tree.predict_row(row).first().copied().unwrap_or(0.0);
            }
        }
        raw
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax_row(raw: &[f64], out: &mut [f64]) {
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut total = 0.0;
    for (o, &r) in out.iter_mut().zip(raw) {
        *o = (r - max).exp();
        total += *o;
    }
    for o in out.iter_mut() {
        *o /= total;
    }
}

impl FeatureImportanceClassifier for GradientBoostingClassifier {
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: ArrayView1<'_, i64>) -> Result<()> {
        ensure_fit_inputs(features, labels)?;
        let encoding = ClassEncoding::fit(labels);
        let classes = encoding.encode(labels);
        let n = features.nrows();
        let n_classes = encoding.len();
        let mut fitted = Fitted {
            encoding,
            n_features: features.ncols(),
            init: Vec::new(),
            stages: Vec::new(),
        };
        if n_classes < 2 {
            self.fitted = Some(fitted);
            return Ok(());
        }

        let n_outputs = if n_classes == 2 { 1 } else { n_classes };
        let mut priors = vec![0.0; n_classes];
        for &c in &classes {
            priors[c] += 1.0 / n as f64;
        }
        fitted.init = if n_outputs == 1 {
            vec![(priors[1] / priors[0]).ln()]
        } else {
            priors.iter().map(|p| p.ln()).collect()
        };

        let presorted = Presorted::new(features);
        let config = TreeConfig {
            max_depth: Some(self.max_depth),
            ..TreeConfig::default()
        };
        let weights = vec![1.0; n];
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut raw = Array2::<f64>::zeros((n, n_outputs));
        for mut row in raw.rows_mut() {
            for (slot, &init) in row.iter_mut().zip(&fitted.init) {
                *slot = init;
            }
        }
        let mut proba = vec![0.0; n_outputs];
        let mut residuals = vec![vec![0.0; n]; n_outputs];

        for stage_index in 0..self.n_estimators {
            for s in 0..n {
                if n_outputs == 1 {
                    let p = sigmoid(raw[[s, 0]]);
                    residuals[0][s] = if classes[s] == 1 { 1.0 } else { 0.0 } - p;
                } else {
                    let row: Vec<f64> = raw.row(s).to_vec();
                    softmax_row(&row, &mut proba);
                    for k in 0..n_outputs {
                        let y = if classes[s] == k { 1.0 } else { 0.0 };
                        residuals[k][s] = y - proba[k];
                    }
                }
            }

            let mut stage = Vec::with_capacity(n_outputs);
            for (k, residual) in residuals.iter().enumerate() {
                let mut tree = DecisionTree::fit(
                    features,
                    Target::Regression(residual),
                    &weights,
                    &presorted,
                    &config,
                    &mut rng,
                );
                let leaves: Vec<usize> = features.rows().into_iter().map(|r| tree.apply(r)).collect();
                let n_nodes = tree.node_count();
                let mut numerator = vec![0.0; n_nodes];
                let mut denominator = vec![0.0; n_nodes];
                for (s, &leaf) in leaves.iter().enumerate() {
                    let r = residual[s];
                    numerator[leaf] += r;
                    denominator[leaf] += if n_outputs == 1 {
                        let p = classes[s] as f64 - r;
                        p * (1.0 - p)
                    } else {
                        r.abs() * (1.0 - r.abs())
                    };
                }
                let scale = if n_outputs == 1 {
                    1.0
                } else {
                    (n_classes as f64 - 1.0) / n_classes as f64
                };
                let values: Vec<f64> = numerator
                    .iter()
                    .zip(&denominator)
                    .map(|(&num, &den)| {
                        if den.abs() < DENOMINATOR_FLOOR {
                            0.0
                        } else {
                            scale * num / den
                        }
                    })
                    .collect();
                let mut seen = vec![false; n_nodes];
                for &leaf in &leaves {
                    if !seen[leaf] {
                        seen[leaf] = true;
                        tree.set_leaf_value(leaf, vec![values[leaf]]);
                    }
                }
                for (s, &leaf) in leaves.iter().enumerate() {
                    raw[[s, k]] += self.learning_rate * values[leaf];
                }
                stage.push(tree);
            }
            fitted.stages.push(stage);
            trace!(stage = stage_index, "boosting stage fitted");
        }

        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<i64>> {
        let fitted = self.fitted.as_ref().ok_or_else(not_fitted)?;
        ensure_predict_width(features, fitted.n_features)?;
        let predictions = features
            .rows()
            .into_iter()
            .map(|row| {
                if fitted.encoding.len() < 2 {
                    return fitted.encoding.decode(0);
                }
                let raw = Self::raw_scores(fitted, row, self.learning_rate);
                let class = if raw.len() == 1 {
                    usize::from(raw[0] > 0.0)
                } else {
                    raw.iter()
                        .enumerate()
                        .fold((0, f64::NEG_INFINITY), |best, (k, &v)| {
                            if v > best.1 {
                                (k, v)
                            } else {
                                best
                            }
                        })
                        .0
                };
                fitted.encoding.decode(class)
            })
            .collect();
        Ok(predictions)
    }

    /// Mean unnormalized importance over every tree that split at least
    /// once, rescaled to sum to 1.
    fn feature_importances(&self) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(not_fitted)?;
        let relevant: Vec<Vec<f64>> = fitted
            .stages
            .iter()
            .flatten()
            .filter(|tree| tree.node_count() > 1)
            .map(DecisionTree::raw_importances)
            .collect();
        let mut mean = vec![0.0; fitted.n_features];
        if relevant.is_empty() {
            return Ok(Array1::from(mean));
        }
        for importances in &relevant {
            for (m, v) in mean.iter_mut().zip(importances) {
                *m += v / relevant.len() as f64;
            }
        }
        Ok(super::normalize_importances(mean))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use rand::Rng;

    fn noisy_problem(n_classes: i64) -> (Array2<f64>, Array1<i64>) {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 240;
        let labels = Array1::from_shape_fn(n, |i| i as i64 % n_classes);
        let features = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => labels[i] as f64 + rng.gen_range(-0.2..0.2),
            _ => rng.gen_range(-1.0..1.0),
        });
        (features, labels)
    }

    #[test]
    fn binary_boosting_finds_the_signal_feature() {
        let (x, y) = noisy_problem(2);
        let mut model = GradientBoostingClassifier::new(0);
        model.fit(x.view(), y.view()).unwrap();
        let predicted = model.predict(x.view()).unwrap();
        assert_eq!(predicted, y);
        let imp = model.feature_importances().unwrap();
        assert!((imp.sum() - 1.0).abs() < 1e-9);
        assert!(imp[0] > 0.9, "importances {imp:?}");
    }

    #[test]
    fn multiclass_boosting_predicts_original_labels() {
        let (x, y) = noisy_problem(3);
        let y = y.mapv(|v| v * 10 - 5);
        let mut model = GradientBoostingClassifier::new(0);
        model.n_estimators = 20;
        model.fit(x.view(), y.view()).unwrap();
        let predicted = model.predict(x.view()).unwrap();
        assert_eq!(predicted, y);
        assert!(model.feature_importances().unwrap()[0] > 0.9);
    }

    #[test]
    fn single_class_fit_has_no_importance() {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i * 2 + j) as f64);
        let y = Array1::from_elem(10, 4);
        let mut model = GradientBoostingClassifier::new(0);
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.feature_importances().unwrap().to_vec(), vec![0.0, 0.0]);
        assert!(model.predict(x.view()).unwrap().iter().all(|&v| v == 4));
    }

    #[test]
    fn predicting_before_fit_fails() {
        let model = GradientBoostingClassifier::new(0);
        assert!(model.predict(Array2::zeros((1, 1)).view()).is_err());
    }
}
