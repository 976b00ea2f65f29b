// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Relative strength of code/factor correlation matrices.

use crate::matrix::{ensure_non_empty, ensure_same_rows, mean_std};
use crate::{MetricsError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Correlation coefficient used by [`correlation_matrix`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    /// Pearson correlation of average ranks.
    Spearman,
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CorrelationMethod::Pearson => "pearson",
            CorrelationMethod::Spearman => "spearman",
        })
    }
}

impl FromStr for CorrelationMethod {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pearson" => Ok(CorrelationMethod::Pearson),
            "spearman" => Ok(CorrelationMethod::Spearman),
            _ => Err(MetricsError::UnsupportedAlgorithm {
                name: s.to_string(),
                expected: "pearson, spearman",
            }),
        }
    }
}

/// Mean over lanes of `max² / sum` with non-finite ratios counted as 0.
fn axis_strength(matrix: &Array2<f64>, axis: Axis) -> f64 {
    let lanes = matrix.lanes(axis);
    let ratios: Vec<f64> = lanes
        .into_iter()
        .map(|lane| {
            let max = lane.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let ratio = max * max / lane.sum();
            if ratio.is_finite() {
                ratio
            } else {
                0.0
            }
        })
        .collect();
    ratios.iter().sum::<f64>() / ratios.len() as f64
}

/// Average of the column-wise and row-wise `max² / sum` scores of a
/// correlation matrix. The identity matrix scores exactly 1.
pub fn relative_strength(correlation: &Array2<f64>) -> Result<f64> {
    ensure_non_empty(correlation.view(), "correlation matrix")?;
    let columns = axis_strength(correlation, Axis(0));
    let rows = axis_strength(correlation, Axis(1));
    Ok((columns + rows) / 2.0)
}

fn average_ranks(column: ArrayView1<'_, f64>) -> Array1<f64> {
    let mut order: Vec<usize> = (0..column.len()).collect();
    order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));
    let mut ranks = Array1::<f64>::zeros(column.len());
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && column[order[end]] == column[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

fn pearson(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    let (mx, sx) = mean_std(x);
    let (my, sy) = mean_std(y);
    if sx <= 0.0 || sy <= 0.0 {
        return 0.0;
    }
    let cov = x
        .iter()
        .zip(y.iter())
        .map(|(a, b)| (a - mx) * (b - my))
        .sum::<f64>()
        / x.len() as f64;
    (cov / (sx * sy)).clamp(-1.0, 1.0)
}

/// Correlation between every code and every factor, shape
/// `[n_codes, n_factors]`. Zero-variance columns correlate as 0.
pub fn correlation_matrix(
    representations: &Array2<f64>,
    factors: &Array2<f64>,
    method: CorrelationMethod,
) -> Result<Array2<f64>> {
    ensure_same_rows(
        representations.view(),
        "representations",
        factors.view(),
        "factors",
    )?;
    if representations.iter().chain(factors.iter()).any(|v| !v.is_finite()) {
        return Err(MetricsError::InvalidArgument(
            "correlation inputs contain non-finite values".to_string(),
        ));
    }
    let prepare = |m: &Array2<f64>| -> Vec<Array1<f64>> {
        m.axis_iter(Axis(1))
            .map(|col| match method {
                CorrelationMethod::Pearson => col.to_owned(),
                CorrelationMethod::Spearman => average_ranks(col),
            })
            .collect()
    };
    let codes = prepare(representations);
    let targets = prepare(factors);
    let mut out = Array2::<f64>::zeros((codes.len(), targets.len()));
    for (i, code) in codes.iter().enumerate() {
        for (j, target) in targets.iter().enumerate() {
            out[[i, j]] = pearson(code.view(), target.view());
        }
    }
    Ok(out)
}

/// [`relative_strength`] of the absolute code/factor correlation matrix.
pub fn relative_disentanglement_strength(
    representations: &Array2<f64>,
    factors: &Array2<f64>,
    method: CorrelationMethod,
) -> Result<f64> {
    let correlation = correlation_matrix(representations, factors, method)?.mapv(f64::abs);
    let score = relative_strength(&correlation)?;
    debug!(%method, score, "relative disentanglement strength");
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn identity_has_unit_strength() {
        for n in 1..6 {
            let eye = Array2::<f64>::eye(n);
            assert_abs_diff_eq!(relative_strength(&eye).unwrap(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn zero_lanes_count_as_zero() {
        let m = array![[1.0, 0.0], [0.0, 0.0]];
        // Columns: 1, 0 (0/0). Rows: 1, 0 (0/0).
        assert_abs_diff_eq!(relative_strength(&m).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn uniform_matrix_is_weak() {
        let m = Array2::<f64>::from_elem((4, 4), 0.5);
        assert_abs_diff_eq!(relative_strength(&m).unwrap(), 0.125, epsilon = 1e-12);
    }

    #[test]
    fn spearman_ignores_monotone_warping() {
        let reps = array![[1.0], [2.0], [3.0], [4.0]];
        let factors = array![[1.0], [8.0], [27.0], [64.0]];
        let spearman = correlation_matrix(&reps, &factors, CorrelationMethod::Spearman).unwrap();
        let pearson = correlation_matrix(&reps, &factors, CorrelationMethod::Pearson).unwrap();
        assert_abs_diff_eq!(spearman[[0, 0]], 1.0, epsilon = 1e-12);
        assert!(pearson[[0, 0]] < 1.0);
    }

    #[test]
    fn ties_share_average_ranks() {
        let ranks = average_ranks(array![3.0, 1.0, 3.0, 2.0].view());
        assert_eq!(ranks.to_vec(), vec![3.5, 1.0, 3.5, 2.0]);
    }

    #[test]
    fn aligned_codes_are_strongly_disentangled() {
        let reps = array![[0.0, 1.0], [1.0, 0.0], [2.0, 0.0], [3.0, 1.0]];
        let factors = array![[0.0, 5.0], [2.0, 3.0], [4.0, 3.0], [6.0, 5.0]];
        let score =
            relative_disentanglement_strength(&reps, &factors, CorrelationMethod::Pearson)
                .unwrap();
        assert_abs_diff_eq!(score, 1.0, epsilon = 1e-12);
        let constant = Array2::<f64>::from_elem((4, 2), 1.0);
        let m = correlation_matrix(&constant, &factors, CorrelationMethod::Pearson).unwrap();
        assert!(m.iter().all(|&v| v == 0.0));
    }
}
