// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::tree::{DecisionTree, Presorted, Target, TreeConfig};
use super::{
    ensure_fit_inputs, ensure_predict_width, normalize_importances, not_fitted, ClassEncoding,
    FeatureImportanceClassifier,
};
use crate::Result;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Clone, Debug)]
struct Fitted {
    encoding: ClassEncoding,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

/// Bagged gini trees with `sqrt(n_features)` candidates per split.
#[derive(Clone, Debug)]
pub struct RandomForestClassifier {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
    fitted: Option<Fitted>,
}

impl RandomForestClassifier {
    pub fn new(seed: u64) -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            seed,
            fitted: None,
        }
    }
}

impl FeatureImportanceClassifier for RandomForestClassifier {
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: ArrayView1<'_, i64>) -> Result<()> {
        ensure_fit_inputs(features, labels)?;
        let encoding = ClassEncoding::fit(labels);
        let classes = encoding.encode(labels);
        let n = features.nrows();
        let n_classes = encoding.len();
        let presorted = Presorted::new(features);
        let config = TreeConfig {
            max_depth: self.max_depth,
            max_features: Some(((features.ncols() as f64).sqrt() as usize).max(1)),
            ..TreeConfig::default()
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut trees = Vec::with_capacity(self.n_estimators);
        let mut weights = vec![0.0; n];
        for _ in 0..self.n_estimators {
            weights.iter_mut().for_each(|w| *w = 0.0);
            for _ in 0..n {
                weights[rng.gen_range(0..n)] += 1.0;
            }
            let mut tree_rng = StdRng::seed_from_u64(rng.gen());
            trees.push(DecisionTree::fit(
                features,
                Target::Classification {
                    classes: &classes,
                    n_classes,
                },
                &weights,
                &presorted,
                &config,
                &mut tree_rng,
            ));
        }

        self.fitted = Some(Fitted {
            encoding,
            n_features: features.ncols(),
            trees,
        });
        Ok(())
    }

    /// Majority vote over averaged leaf class frequencies.
    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<i64>> {
        let fitted = self.fitted.as_ref().ok_or_else(not_fitted)?;
        ensure_predict_width(features, fitted.n_features)?;
        let n_classes = fitted.encoding.len();
        let predictions = features
            .rows()
            .into_iter()
            .map(|row| {
                let mut votes = vec![0.0; n_classes];
                for tree in &fitted.trees {
                    for (v, p) in votes.iter_mut().zip(tree.predict_row(row)) {
                        *v += p;
                    }
                }
                let class = votes
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (k, &v)| {
                        if v > best.1 {
                            (k, v)
                        } else {
                            best
                        }
                    })
                    .0;
                fitted.encoding.decode(class)
            })
            .collect();
        Ok(predictions)
    }

    fn feature_importances(&self) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(not_fitted)?;
        let relevant: Vec<Vec<f64>> = fitted
            .trees
            .iter()
            .filter(|tree| tree.node_count() > 1)
            .map(DecisionTree::normalized_importances)
            .collect();
        let mut mean = vec![0.0; fitted.n_features];
        for importances in &relevant {
            for (m, v) in mean.iter_mut().zip(importances) {
                *m += v / relevant.len() as f64;
            }
        }
        Ok(normalize_importances(mean))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn forest_prefers_the_informative_feature() {
        let mut rng = StdRng::seed_from_u64(5);
        let n = 200;
        let labels = Array1::from_shape_fn(n, |i| (i % 2) as i64);
        let x = Array2::from_shape_fn((n, 4), |(i, j)| {
            if j == 2 {
                labels[i] as f64 * 3.0 + rng.gen_range(-0.5..0.5)
            } else {
                rng.gen_range(-1.0..1.0)
            }
        });
        let mut model = RandomForestClassifier::new(3);
        model.n_estimators = 30;
        model.fit(x.view(), labels.view()).unwrap();
        assert_eq!(model.predict(x.view()).unwrap(), labels);
        let imp = model.feature_importances().unwrap();
        assert!((imp.sum() - 1.0).abs() < 1e-9);
        let best = imp
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(best, Some(2));
    }

    #[test]
    fn forest_is_reproducible_for_a_seed() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let y = Array1::from_shape_fn(30, |i| (i % 3) as i64);
        let mut a = RandomForestClassifier::new(9);
        let mut b = RandomForestClassifier::new(9);
        a.n_estimators = 10;
        b.n_estimators = 10;
        a.fit(x.view(), y.view()).unwrap();
        b.fit(x.view(), y.view()).unwrap();
        assert_eq!(a.feature_importances().unwrap(), b.feature_importances().unwrap());
    }
}
