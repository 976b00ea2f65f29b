// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Per-factor classifier fits that yield the `[n_codes, n_factors]`
//! importance matrix used by DCI.

use crate::classifier::ClassifierKind;
use crate::matrix::{accuracy, ensure_split};
use crate::pool::FactorPool;
use crate::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Importance matrix together with per-factor prediction accuracy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportanceMatrix {
    /// `[n_codes, n_factors]`, non-negative.
    pub importance: Array2<f64>,
    pub train_accuracy: Array1<f64>,
    pub test_accuracy: Array1<f64>,
}

struct FactorFit {
    importances: Array1<f64>,
    train_accuracy: f64,
    test_accuracy: f64,
}

/// Fits one classifier per factor column on the shared [`FactorPool`].
pub fn representative_importance_matrix(
    repr_train: &Array2<f64>,
    factor_train: &Array2<i64>,
    repr_test: &Array2<f64>,
    factor_test: &Array2<i64>,
    seed: u64,
    classifier: ClassifierKind,
) -> Result<ImportanceMatrix> {
    representative_importance_matrix_on(
        FactorPool::shared()?,
        repr_train,
        factor_train,
        repr_test,
        factor_test,
        seed,
        classifier,
    )
}

/// [`representative_importance_matrix`] on an explicit pool.
pub fn representative_importance_matrix_on(
    pool: &FactorPool,
    repr_train: &Array2<f64>,
    factor_train: &Array2<i64>,
    repr_test: &Array2<f64>,
    factor_test: &Array2<i64>,
    seed: u64,
    classifier: ClassifierKind,
) -> Result<ImportanceMatrix> {
    ensure_split(repr_train, factor_train, repr_test, factor_test)?;
    let n_codes = repr_train.ncols();
    let n_factors = factor_train.ncols();

    let fits = pool.run(n_factors, |j| {
        let y_train = factor_train.column(j);
        let y_test = factor_test.column(j);
        let distinct: HashSet<i64> = y_train.iter().copied().collect();
        if distinct.len() < 2 {
            warn!(factor = j, "factor has a single class in the training split");
        }
        let mut model = classifier.build(seed);
        model.fit(repr_train.view(), y_train)?;
        let importances = model.feature_importances()?.mapv(f64::abs);
        let train_accuracy = accuracy(y_train, model.predict(repr_train.view())?.view());
        let test_accuracy = accuracy(y_test, model.predict(repr_test.view())?.view());
        Ok(FactorFit {
            importances,
            train_accuracy,
            test_accuracy,
        })
    })?;

    let mut importance = Array2::<f64>::zeros((n_codes, n_factors));
    let mut train_accuracy = Array1::<f64>::zeros(n_factors);
    let mut test_accuracy = Array1::<f64>::zeros(n_factors);
    for (j, fit) in fits.into_iter().enumerate() {
        importance.column_mut(j).assign(&fit.importances);
        train_accuracy[j] = fit.train_accuracy;
        test_accuracy[j] = fit.test_accuracy;
    }
    debug!(
        codes = n_codes,
        factors = n_factors,
        %classifier,
        "importance matrix estimated"
    );
    Ok(ImportanceMatrix {
        importance,
        train_accuracy,
        test_accuracy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricsError;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn two_factor_data(n: usize, seed: u64) -> (Array2<f64>, Array2<i64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let factors = Array2::from_shape_fn((n, 2), |_| rng.gen_range(0..3));
        let reps = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => factors[[i, 1]] as f64 + rng.gen_range(-0.1..0.1),
            1 => factors[[i, 0]] as f64 + rng.gen_range(-0.1..0.1),
            _ => rng.gen_range(-1.0..1.0),
        });
        (reps, factors)
    }

    #[test]
    fn each_factor_column_points_at_its_code() {
        let (r_train, f_train) = two_factor_data(150, 1);
        let (r_test, f_test) = two_factor_data(60, 2);
        let pool = FactorPool::new(2).unwrap();
        let m = representative_importance_matrix_on(
            &pool,
            &r_train,
            &f_train,
            &r_test,
            &f_test,
            0,
            ClassifierKind::GradientBoosting,
        )
        .unwrap();
        assert_eq!(m.importance.dim(), (3, 2));
        assert!(m.importance[[1, 0]] > 0.9);
        assert!(m.importance[[0, 1]] > 0.9);
        assert!(m.test_accuracy.iter().all(|&a| a > 0.95));
        assert!(m.importance.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn matrix_round_trips_through_json() {
        let (r_train, f_train) = two_factor_data(60, 6);
        let (r_test, f_test) = two_factor_data(30, 7);
        let pool = FactorPool::new(1).unwrap();
        let m = representative_importance_matrix_on(
            &pool,
            &r_train,
            &f_train,
            &r_test,
            &f_test,
            0,
            ClassifierKind::Logistic,
        )
        .unwrap();
        let json = serde_json::to_string(&m).unwrap();
        let back: ImportanceMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(back.importance.dim(), (3, 2));
        for (a, b) in back.importance.iter().zip(m.importance.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert_eq!(back.test_accuracy.len(), 2);
    }

    #[test]
    fn constant_factor_yields_zero_column() {
        let (r_train, mut f_train) = two_factor_data(40, 3);
        let (r_test, mut f_test) = two_factor_data(20, 4);
        f_train.column_mut(1).fill(7);
        f_test.column_mut(1).fill(7);
        let pool = FactorPool::new(1).unwrap();
        let m = representative_importance_matrix_on(
            &pool,
            &r_train,
            &f_train,
            &r_test,
            &f_test,
            0,
            ClassifierKind::RandomForest,
        )
        .unwrap();
        assert!(m.importance.column(1).iter().all(|&v| v == 0.0));
        assert_eq!(m.test_accuracy[1], 1.0);
    }

    #[test]
    fn mismatched_widths_are_shape_errors() {
        let (r_train, f_train) = two_factor_data(10, 5);
        let r_test = Array2::<f64>::zeros((4, 2));
        let f_test = Array2::<i64>::zeros((4, 2));
        let err = representative_importance_matrix(
            &r_train,
            &f_train,
            &r_test,
            &f_test,
            0,
            ClassifierKind::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MetricsError::Shape(_)));
    }
}
