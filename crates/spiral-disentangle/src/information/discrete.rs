// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Contingency-table mutual information and Shannon entropy over integer
//! labels.

use crate::matrix::{ensure_non_empty, ensure_same_rows};
use crate::{MetricsError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::collections::HashMap;

/// Integer labels re-encoded as dense class ids `0..n_classes`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LabelColumn {
    pub ids: Vec<usize>,
    pub counts: Vec<usize>,
}

impl LabelColumn {
    /// Encodes labels in order of first appearance.
    pub fn encode<'a>(labels: impl IntoIterator<Item = &'a i64>) -> Self {
        let mut lookup: HashMap<i64, usize> = HashMap::new();
        let mut ids = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        for &label in labels {
            let next = lookup.len();
            let id = *lookup.entry(label).or_insert(next);
            if id == counts.len() {
                counts.push(0);
            }
            counts[id] += 1;
            ids.push(id);
        }
        Self { ids, counts }
    }

    pub fn n_classes(&self) -> usize {
        self.counts.len()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn entropy(&self) -> f64 {
        let n = self.len();
        if n == 0 || self.n_classes() <= 1 {
            return 0.0;
        }
        let log_n = (n as f64).ln();
        let h = -self
            .counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| (c as f64 / n as f64) * ((c as f64).ln() - log_n))
            .sum::<f64>();
        h.max(0.0)
    }

    /// Contingency-table MI with `other`; both columns must be equally long.
    pub fn mutual_info(&self, other: &LabelColumn) -> f64 {
        let n = self.len();
        if n == 0 || self.n_classes() <= 1 || other.n_classes() <= 1 {
            return 0.0;
        }
        let mut joint: HashMap<(usize, usize), usize> = HashMap::new();
        for (&a, &b) in self.ids.iter().zip(other.ids.iter()) {
            *joint.entry((a, b)).or_insert(0) += 1;
        }
        let n_f = n as f64;
        let mi = joint
            .iter()
            .map(|(&(a, b), &nij)| {
                let nij = nij as f64;
                let outer = self.counts[a] as f64 * other.counts[b] as f64;
                (nij / n_f) * ((nij * n_f).ln() - outer.ln())
            })
            .sum::<f64>();
        mi.max(0.0)
    }
}

/// Mutual information (nats) between two label columns.
pub fn mutual_info_score(a: ArrayView1<'_, i64>, b: ArrayView1<'_, i64>) -> Result<f64> {
    if a.len() != b.len() {
        return Err(MetricsError::Shape(format!(
            "label columns differ in length ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    Ok(LabelColumn::encode(a.iter()).mutual_info(&LabelColumn::encode(b.iter())))
}

/// Shannon entropy (nats) of the empirical label frequencies.
///
/// A constant or empty column has entropy exactly 0.
pub fn entropy(labels: ArrayView1<'_, i64>) -> f64 {
    LabelColumn::encode(labels.iter()).entropy()
}

/// Column-wise [`entropy`] of a `[n_samples, n_factors]` label matrix.
pub fn discrete_entropy(labels: &Array2<i64>) -> Array1<f64> {
    labels.axis_iter(Axis(1)).map(entropy).collect()
}

/// Pairwise mutual information between every code column and every factor
/// column, shape `[n_codes, n_factors]`.
pub fn discrete_mutual_info(codes: &Array2<i64>, factors: &Array2<i64>) -> Result<Array2<f64>> {
    ensure_same_rows(codes.view(), "codes", factors.view(), "factors")?;
    let code_columns: Vec<LabelColumn> = codes
        .axis_iter(Axis(1))
        .map(|col| LabelColumn::encode(col.iter()))
        .collect();
    let factor_columns: Vec<LabelColumn> = factors
        .axis_iter(Axis(1))
        .map(|col| LabelColumn::encode(col.iter()))
        .collect();

    let mut m = Array2::<f64>::zeros((code_columns.len(), factor_columns.len()));
    for (i, code) in code_columns.iter().enumerate() {
        for (j, factor) in factor_columns.iter().enumerate() {
            m[[i, j]] = factor.mutual_info(code);
        }
    }
    Ok(m)
}

/// Equal-width histogram discretisation of each column into `n_bins` bins.
///
/// Bin ids run from `0` to `n_bins - 1`; a column with zero range maps to
/// bin 0.
pub fn discretize(values: &Array2<f64>, n_bins: usize) -> Result<Array2<i64>> {
    if n_bins == 0 {
        return Err(MetricsError::InvalidArgument(
            "n_bins must be > 0".to_string(),
        ));
    }
    ensure_non_empty(values.view(), "values")?;
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(MetricsError::InvalidArgument(format!(
            "cannot discretize non-finite value {bad}"
        )));
    }

    let mut out = Array2::<i64>::zeros(values.dim());
    for (column, mut target) in values.axis_iter(Axis(1)).zip(out.axis_iter_mut(Axis(1))) {
        let lo = column.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let width = hi - lo;
        if width <= 0.0 {
            continue;
        }
        for (slot, &value) in target.iter_mut().zip(column.iter()) {
            let bin = ((value - lo) / width * n_bins as f64).floor() as i64;
            *slot = bin.clamp(0, n_bins as i64 - 1);
        }
    }
    Ok(out)
}
