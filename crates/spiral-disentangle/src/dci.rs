// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Disentanglement, completeness and informativeness (Eastwood & Williams).

use crate::classifier::ClassifierKind;
use crate::importance::representative_importance_matrix;
use crate::matrix::ensure_non_empty;
use crate::{MetricsError, Result};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SMOOTHING: f64 = 1e-11;

/// Scores of one DCI evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DciScores {
    pub disentanglement: f64,
    pub completeness: f64,
    /// Mean test accuracy over factors.
    pub informativeness: f64,
    /// Mean train accuracy over factors.
    pub train_informativeness: f64,
}

/// Entropy of `weights` (rescaled to a distribution) in log base `base`.
///
/// Returns 0 for `base <= 1` and for weights without mass.
pub fn normalized_entropy(weights: ArrayView1<'_, f64>, base: usize) -> f64 {
    if base <= 1 {
        return 0.0;
    }
    let total: f64 = weights.sum();
    if !(total > 0.0) {
        return 0.0;
    }
    let h = -weights
        .iter()
        .filter(|&&w| w > 0.0)
        .map(|&w| {
            let p = w / total;
            p * p.ln()
        })
        .sum::<f64>();
    h / (base as f64).ln()
}

/// Share of total mass carried by each lane along `axis`, uniform when the
/// matrix has no mass.
fn mass_shares(importance: &Array2<f64>, axis: Axis) -> Vec<f64> {
    let total: f64 = importance.sum();
    if total > 0.0 {
        importance
            .sum_axis(axis)
            .iter()
            .map(|lane| lane / total)
            .collect()
    } else {
        let lanes = importance.len_of(Axis(1 - axis.index()));
        warn!("importance matrix has no mass, weighting lanes uniformly");
        vec![1.0 / lanes as f64; lanes]
    }
}

fn ensure_importance(importance: &Array2<f64>) -> Result<()> {
    ensure_non_empty(importance.view(), "importance matrix")?;
    if importance.iter().any(|v| !(v.is_finite() && *v >= 0.0)) {
        return Err(MetricsError::InvalidArgument(
            "importance matrix must be finite and non-negative".to_string(),
        ));
    }
    Ok(())
}

/// Mass-weighted `1 − H_k(row)` over codes of a `[n_codes, n_factors]`
/// importance matrix.
pub fn disentanglement_score(importance: &Array2<f64>) -> Result<f64> {
    ensure_importance(importance)?;
    let n_factors = importance.ncols();
    let smoothed = importance + SMOOTHING;
    let shares = mass_shares(importance, Axis(1));
    Ok(smoothed
        .axis_iter(Axis(0))
        .zip(shares)
        .map(|(row, share)| (1.0 - normalized_entropy(row, n_factors)) * share)
        .sum())
}

/// Mass-weighted `1 − H_d(column)` over factors.
pub fn completeness_score(importance: &Array2<f64>) -> Result<f64> {
    ensure_importance(importance)?;
    let n_codes = importance.nrows();
    let smoothed = importance + SMOOTHING;
    let shares = mass_shares(importance, Axis(0));
    Ok(smoothed
        .axis_iter(Axis(1))
        .zip(shares)
        .map(|(column, share)| (1.0 - normalized_entropy(column, n_codes)) * share)
        .sum())
}

/// DCI with the default gradient-boosting classifier.
pub fn dci_scores(
    repr_train: &Array2<f64>,
    factor_train: &Array2<i64>,
    repr_test: &Array2<f64>,
    factor_test: &Array2<i64>,
    seed: u64,
) -> Result<DciScores> {
    dci_scores_with(
        repr_train,
        factor_train,
        repr_test,
        factor_test,
        seed,
        ClassifierKind::GradientBoosting,
    )
}

pub fn dci_scores_with(
    repr_train: &Array2<f64>,
    factor_train: &Array2<i64>,
    repr_test: &Array2<f64>,
    factor_test: &Array2<i64>,
    seed: u64,
    classifier: ClassifierKind,
) -> Result<DciScores> {
    let matrix = representative_importance_matrix(
        repr_train,
        factor_train,
        repr_test,
        factor_test,
        seed,
        classifier,
    )?;
    let scores = DciScores {
        disentanglement: disentanglement_score(&matrix.importance)?,
        completeness: completeness_score(&matrix.importance)?,
        informativeness: matrix.test_accuracy.mean().unwrap_or(0.0),
        train_informativeness: matrix.train_accuracy.mean().unwrap_or(0.0),
    };
    debug!(
        disentanglement = scores.disentanglement,
        completeness = scores.completeness,
        informativeness = scores.informativeness,
        "dci scores"
    );
    Ok(scores)
}

/// Disentanglement and completeness of a mutual-information matrix.
pub fn dcmi_scores(mutual_info: &Array2<f64>) -> Result<(f64, f64)> {
    Ok((
        disentanglement_score(mutual_info)?,
        completeness_score(mutual_info)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    #[test]
    fn diagonal_importance_is_fully_disentangled() {
        let m = Array2::<f64>::eye(4);
        assert_abs_diff_eq!(disentanglement_score(&m).unwrap(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(completeness_score(&m).unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn uniform_importance_is_fully_entangled() {
        let m = Array2::<f64>::from_elem((3, 3), 0.2);
        assert_abs_diff_eq!(disentanglement_score(&m).unwrap(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(completeness_score(&m).unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_matrix_falls_back_to_uniform_weights() {
        let m = Array2::<f64>::zeros((2, 3));
        let d = disentanglement_score(&m).unwrap();
        let c = completeness_score(&m).unwrap();
        assert!(d.is_finite() && c.is_finite());
        assert_abs_diff_eq!(d, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn one_code_carrying_two_factors_is_entangled() {
        let m = array![[1.0, 1.0], [0.0, 0.0]];
        assert_abs_diff_eq!(disentanglement_score(&m).unwrap(), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(completeness_score(&m).unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn single_factor_entropy_base_is_degenerate() {
        let m = array![[0.5], [0.5]];
        assert_abs_diff_eq!(disentanglement_score(&m).unwrap(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(completeness_score(&m).unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn negative_entries_are_rejected() {
        let m = array![[1.0, -0.1]];
        assert!(disentanglement_score(&m).is_err());
    }

    #[test]
    fn dcmi_matches_the_two_scores() {
        let mi = array![[0.6, 0.0], [0.1, 0.4]];
        let (d, c) = dcmi_scores(&mi).unwrap();
        assert_abs_diff_eq!(d, disentanglement_score(&mi).unwrap());
        assert_abs_diff_eq!(c, completeness_score(&mi).unwrap());
    }
}
