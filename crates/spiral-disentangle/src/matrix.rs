// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Shape validation and small column statistics shared by the metrics.

use crate::{MetricsError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};

/// Rejects matrices without rows or columns.
pub fn ensure_non_empty<T>(matrix: ArrayView2<'_, T>, what: &str) -> Result<()> {
    let (rows, cols) = matrix.dim();
    if rows == 0 || cols == 0 {
        return Err(MetricsError::Shape(format!(
            "{what} must be non-empty, got {rows}x{cols}"
        )));
    }
    Ok(())
}

/// Rejects a pair of matrices whose sample counts differ.
pub fn ensure_same_rows<A, B>(
    left: ArrayView2<'_, A>,
    left_name: &str,
    right: ArrayView2<'_, B>,
    right_name: &str,
) -> Result<()> {
    ensure_non_empty(left, left_name)?;
    ensure_non_empty(right, right_name)?;
    if left.nrows() != right.nrows() {
        return Err(MetricsError::Shape(format!(
            "{left_name} has {} rows but {right_name} has {}",
            left.nrows(),
            right.nrows()
        )));
    }
    Ok(())
}

/// Rejects a pair of matrices whose widths differ.
pub fn ensure_same_cols<A, B>(
    left: ArrayView2<'_, A>,
    left_name: &str,
    right: ArrayView2<'_, B>,
    right_name: &str,
) -> Result<()> {
    if left.ncols() != right.ncols() {
        return Err(MetricsError::Shape(format!(
            "{left_name} has {} columns but {right_name} has {}",
            left.ncols(),
            right.ncols()
        )));
    }
    Ok(())
}

/// Validates a train/test split of representations and factors.
pub fn ensure_split<A, B>(
    repr_train: &Array2<A>,
    factor_train: &Array2<B>,
    repr_test: &Array2<A>,
    factor_test: &Array2<B>,
) -> Result<()> {
    ensure_same_rows(
        repr_train.view(),
        "train representations",
        factor_train.view(),
        "train factors",
    )?;
    ensure_same_rows(
        repr_test.view(),
        "test representations",
        factor_test.view(),
        "test factors",
    )?;
    ensure_same_cols(
        repr_train.view(),
        "train representations",
        repr_test.view(),
        "test representations",
    )?;
    ensure_same_cols(
        factor_train.view(),
        "train factors",
        factor_test.view(),
        "test factors",
    )
}

/// Population mean and standard deviation (ddof = 0).
pub fn mean_std(column: ArrayView1<'_, f64>) -> (f64, f64) {
    let n = column.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = column.sum() / n as f64;
    let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}

/// Fraction of positions where both label slices agree.
pub fn accuracy(expected: ArrayView1<'_, i64>, predicted: ArrayView1<'_, i64>) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    let hits = expected
        .iter()
        .zip(predicted.iter())
        .filter(|(a, b)| a == b)
        .count();
    hits as f64 / expected.len() as f64
}

/// Converts a float column into integer labels, failing on non-finite values.
pub fn labels_from_floats(column: ArrayView1<'_, f64>) -> std::result::Result<Vec<i64>, String> {
    column
        .iter()
        .enumerate()
        .map(|(row, &value)| {
            if value.is_finite() {
                Ok(value.round() as i64)
            } else {
                Err(format!("non-finite label {value} at row {row}"))
            }
        })
        .collect()
}
